use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;

use crate::state::{authority::CourtSnapshot, court::CourtMode};

/// Payload of the `court-status` event and `GET /api/court/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CourtStatusPayload {
    pub is_open: bool,
    /// Server clock when the payload was produced.
    #[serde(with = "time::serde::rfc3339")]
    pub current_time: OffsetDateTime,
    /// Configured display timezone of the venue.
    pub timezone: String,
    pub mode: CourtMode,
    pub active_matches: usize,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub cooldown_end: Option<OffsetDateTime>,
    /// Monotonic court revision.
    pub revision: u64,
}

impl CourtStatusPayload {
    /// Project an authority snapshot at `now`.
    pub fn from_snapshot(snapshot: CourtSnapshot, now: OffsetDateTime, timezone: &str) -> Self {
        Self {
            is_open: snapshot.court.is_open,
            current_time: now,
            timezone: timezone.to_owned(),
            mode: snapshot.court.mode,
            active_matches: snapshot.active_matches,
            cooldown_end: snapshot.court.cooldown_end,
            revision: snapshot.revision,
        }
    }
}
