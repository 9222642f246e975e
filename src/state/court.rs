use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;

/// Operating mode of the court.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
pub enum CourtMode {
    /// Both teams rest after every match.
    #[default]
    #[serde(rename = "regular")]
    Regular,
    /// The winner goes straight back into the queue.
    #[serde(rename = "champion-return")]
    ChampionReturn,
}

/// Canonical court singleton owned by the authority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourtState {
    /// Whether new teams may join.
    pub is_open: bool,
    /// Current operating mode.
    pub mode: CourtMode,
    /// End of the post-match cooldown, if one is running.
    pub cooldown_end: Option<OffsetDateTime>,
}

impl CourtState {
    /// Initial court state.
    pub fn new(is_open: bool, mode: CourtMode) -> Self {
        Self {
            is_open,
            mode,
            cooldown_end: None,
        }
    }

    /// Whether the post-match cooldown is still running at `now`.
    pub fn in_cooldown(&self, now: OffsetDateTime) -> bool {
        self.cooldown_end.is_some_and(|end| end > now)
    }
}
