//! Service helpers that expose read-only snapshots of the court to any client.
//! Each snapshot carries the revision clients use to order it against deltas.

use crate::{
    dto::{
        court::CourtStatusPayload,
        matches::{CurrentMatchResponse, MatchSnapshot},
        queue::QueueSnapshot,
    },
    state::SharedState,
};

/// Current queue contents.
pub async fn queue_snapshot(state: &SharedState) -> QueueSnapshot {
    let (view, revision) = state.read(|authority, _| authority.queue_snapshot()).await;
    QueueSnapshot::from_view(view, revision)
}

/// Match on (or last on) the court.
pub async fn current_match(state: &SharedState) -> CurrentMatchResponse {
    let (current, revision) = state.read(|authority, _| authority.current_match()).await;
    CurrentMatchResponse {
        current: current.map(MatchSnapshot::from),
        revision,
    }
}

/// Court status stamped with the server clock.
pub async fn court_status(state: &SharedState) -> CourtStatusPayload {
    let config = state.config();
    state
        .read(|authority, now| {
            CourtStatusPayload::from_snapshot(authority.court_snapshot(), now, &config.timezone)
        })
        .await
}
