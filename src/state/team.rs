use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;

/// Where a team currently sits in the rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TeamStatus {
    /// Queued and waiting for the court.
    Waiting,
    /// On court, referenced by the current non-terminal match.
    Playing,
    /// Resting after a match before returning to the queue.
    Cooldown,
}

/// Runtime representation of a team known to the authority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Team {
    /// Stable identifier handed back to the team client on admission.
    pub id: Uuid,
    /// Display name, unique among active teams (case-insensitive).
    pub name: String,
    /// Number of players in the team.
    pub members: u8,
    /// Optional contact handle supplied at admission.
    pub contact_info: Option<String>,
    /// Current rotation status.
    pub status: TeamStatus,
    /// Matches won since admission.
    pub wins: u32,
    /// When the team was (last) admitted into the queue.
    pub joined_at: OffsetDateTime,
    /// Last time the authority saw activity for this team.
    pub last_seen: OffsetDateTime,
}

impl Team {
    /// Build a freshly admitted team.
    pub fn new(
        name: String,
        members: u8,
        contact_info: Option<String>,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            members,
            contact_info,
            status: TeamStatus::Waiting,
            wins: 0,
            joined_at: now,
            last_seen: now,
        }
    }

    /// Normalised key used for display-name uniqueness.
    pub fn name_key(&self) -> String {
        normalize_name(&self.name)
    }
}

/// Trim and lowercase a display name for comparisons.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}
