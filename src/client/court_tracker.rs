//! Read-only mirror of the court status.
//!
//! Cooldown checks are computed against the clock at read time, never cached, so they stay
//! correct across arbitrary gaps between events.

use futures::future::BoxFuture;
use time::OffsetDateTime;

use crate::{
    client::{ClientError, snapshot::SnapshotSource, store::{Mirror, SyncedStore}},
    dto::{court::CourtStatusPayload, ws::EVENT_COURT_STATUS},
    error::ErrorScope,
    state::court::CourtMode,
};

/// Local replica of the court status; empty until the first snapshot or event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CourtMirror {
    pub status: Option<CourtStatusPayload>,
}

impl CourtMirror {
    pub fn is_open(&self) -> bool {
        self.status.as_ref().is_some_and(|status| status.is_open)
    }

    pub fn is_regular_mode(&self) -> bool {
        self.mode() == Some(CourtMode::Regular)
    }

    pub fn is_champion_return_mode(&self) -> bool {
        self.mode() == Some(CourtMode::ChampionReturn)
    }

    pub fn mode(&self) -> Option<CourtMode> {
        self.status.as_ref().map(|status| status.mode)
    }

    /// Matches currently occupying the court.
    pub fn active_matches(&self) -> usize {
        self.status.as_ref().map_or(0, |status| status.active_matches)
    }

    /// Whether the cooldown runs right now.
    pub fn is_in_cooldown(&self) -> bool {
        self.is_in_cooldown_at(OffsetDateTime::now_utc())
    }

    /// Whether the cooldown runs at `now`.
    pub fn is_in_cooldown_at(&self, now: OffsetDateTime) -> bool {
        self.cooldown_end().is_some_and(|end| end > now)
    }

    /// Whole seconds left in the cooldown, rounded up; zero when none runs.
    pub fn cooldown_seconds_remaining(&self) -> u64 {
        self.cooldown_seconds_remaining_at(OffsetDateTime::now_utc())
    }

    /// Whole seconds left in the cooldown at `now`, rounded up.
    pub fn cooldown_seconds_remaining_at(&self, now: OffsetDateTime) -> u64 {
        let Some(end) = self.cooldown_end() else {
            return 0;
        };
        let remaining = end - now;
        if remaining.is_negative() || remaining.is_zero() {
            return 0;
        }
        let secs = remaining.whole_seconds().max(0) as u64;
        if remaining.subsec_nanoseconds() > 0 {
            secs + 1
        } else {
            secs
        }
    }

    fn cooldown_end(&self) -> Option<OffsetDateTime> {
        self.status.as_ref().and_then(|status| status.cooldown_end)
    }
}

impl Mirror for CourtMirror {
    type Snapshot = CourtStatusPayload;
    type Delta = CourtStatusPayload;

    const EVENT: &'static str = EVENT_COURT_STATUS;
    const SCOPE: ErrorScope = ErrorScope::Court;

    fn fetch(
        source: &dyn SnapshotSource,
    ) -> BoxFuture<'static, Result<CourtStatusPayload, ClientError>> {
        source.fetch_court_status()
    }

    fn replace(&mut self, snapshot: CourtStatusPayload) {
        self.status = Some(snapshot);
    }

    fn apply(&mut self, delta: CourtStatusPayload) -> bool {
        if self
            .status
            .as_ref()
            .is_some_and(|status| delta.revision <= status.revision)
        {
            return false;
        }
        self.status = Some(delta);
        true
    }

    fn revision(&self) -> u64 {
        self.status.as_ref().map_or(0, |status| status.revision)
    }
}

/// Court tracker driven by `court-status` events.
pub type CourtTracker = SyncedStore<CourtMirror>;

#[cfg(test)]
mod tests {
    use time::{Duration, macros::datetime};

    use super::*;

    fn status(revision: u64, cooldown_end: Option<OffsetDateTime>) -> CourtStatusPayload {
        CourtStatusPayload {
            is_open: true,
            current_time: datetime!(2024-05-01 18:00 UTC),
            timezone: "Europe/Paris".into(),
            mode: CourtMode::ChampionReturn,
            active_matches: 1,
            cooldown_end,
            revision,
        }
    }

    #[test]
    fn empty_tracker_reports_closed() {
        let tracker = CourtMirror::default();
        assert!(!tracker.is_open());
        assert!(!tracker.is_regular_mode());
        assert!(!tracker.is_in_cooldown());
        assert_eq!(tracker.cooldown_seconds_remaining(), 0);
        assert_eq!(tracker.revision(), 0);
    }

    #[test]
    fn cooldown_is_computed_at_read_time() {
        let end = datetime!(2024-05-01 18:05 UTC);
        let mut tracker = CourtMirror::default();
        tracker.apply(status(1, Some(end)));

        let before = end - Duration::milliseconds(90_500);
        assert!(tracker.is_in_cooldown_at(before));
        assert_eq!(tracker.cooldown_seconds_remaining_at(before), 91);
        assert!(!tracker.is_in_cooldown_at(end));
        assert_eq!(tracker.cooldown_seconds_remaining_at(end), 0);
        assert_eq!(tracker.cooldown_seconds_remaining_at(end + Duration::hours(1)), 0);
    }

    #[test]
    fn older_status_is_dropped() {
        let mut tracker = CourtMirror::default();
        assert!(tracker.apply(status(3, None)));

        let mut stale = status(2, None);
        stale.is_open = false;
        assert!(!tracker.apply(stale));
        assert!(tracker.is_open());
        assert!(tracker.is_champion_return_mode());
        assert_eq!(tracker.active_matches(), 1);
    }

    #[tokio::test]
    async fn tracker_catches_up_on_connect() {
        use std::time::Duration as StdDuration;

        use tokio::{sync::watch, time::timeout};

        use crate::client::{
            ConnectionPhase, ConnectionStatus, EventRouter, snapshot::testing::FakeSource,
        };

        let router = EventRouter::new();
        let source = FakeSource::new();
        source.set_court(Ok(status(5, None)));
        let (connection, status_rx) = watch::channel(ConnectionStatus::default());
        let tracker = CourtTracker::new(&router, status_rx, source.clone());

        connection
            .send(ConnectionStatus {
                phase: ConnectionPhase::Connected,
                connected: true,
                epoch: 1,
                ..ConnectionStatus::default()
            })
            .unwrap();
        let synced = timeout(StdDuration::from_secs(2), tracker.wait_for(|s| s.value.revision() == 5))
            .await
            .unwrap()
            .unwrap();
        assert!(synced.value.is_champion_return_mode());

        router.dispatch(r#"{"event":"error","data":{"code":"COURT_CLOSED","message":"closed"}}"#);
        let synced = timeout(StdDuration::from_secs(2), tracker.wait_for(|s| s.error.is_some()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(synced.error.unwrap().code, crate::error::ErrorCode::CourtClosed);
    }
}
