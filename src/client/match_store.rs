//! Mirror of the match on (or last on) the court.

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::{
    client::{ClientError, snapshot::SnapshotSource, store::{Mirror, SyncedStore}},
    dto::{
        matches::{CurrentMatchResponse, MatchSnapshot, MatchUpdatedEvent},
        ws::EVENT_MATCH_UPDATED,
    },
    error::ErrorScope,
    state::match_machine::{MatchEventKind, MatchStatus},
};

/// Local replica of the current match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchMirror {
    /// Match on the court, or the last finished one.
    pub current: Option<MatchSnapshot>,
    /// Match revision of `current`.
    pub revision: u64,
    /// Kind of the last applied delta.
    pub last_event: Option<MatchEventKind>,
}

impl MatchMirror {
    /// Whether a match is being played or awaits confirmation.
    pub fn is_live(&self) -> bool {
        self.current.as_ref().is_some_and(|current| !current.is_terminal())
    }

    pub fn status(&self) -> Option<MatchStatus> {
        self.current.as_ref().map(|current| current.status)
    }

    /// Whether `team_id` plays in the held match.
    pub fn involves(&self, team_id: Uuid) -> bool {
        self.current
            .as_ref()
            .is_some_and(|current| current.team1.id == team_id || current.team2.id == team_id)
    }

    /// Whether the held match waits for `team_id` to confirm.
    pub fn awaits_confirmation_from(&self, team_id: Uuid) -> bool {
        let Some(current) = &self.current else {
            return false;
        };
        if current.status != MatchStatus::Confirming {
            return false;
        }
        (current.team1.id == team_id && !current.confirmed1)
            || (current.team2.id == team_id && !current.confirmed2)
    }

    // History updates never replace the held match; another match only takes over when it starts.
    fn accepts(&self, event: &MatchUpdatedEvent) -> bool {
        if event.archived {
            return false;
        }
        match &self.current {
            None => true,
            Some(current) => {
                current.id == event.snapshot.id || event.kind == MatchEventKind::MatchStarted
            }
        }
    }
}

impl Mirror for MatchMirror {
    type Snapshot = CurrentMatchResponse;
    type Delta = MatchUpdatedEvent;

    const EVENT: &'static str = EVENT_MATCH_UPDATED;
    const SCOPE: ErrorScope = ErrorScope::Match;

    fn fetch(
        source: &dyn SnapshotSource,
    ) -> BoxFuture<'static, Result<CurrentMatchResponse, ClientError>> {
        source.fetch_current_match()
    }

    fn replace(&mut self, snapshot: CurrentMatchResponse) {
        self.current = snapshot.current;
        self.revision = snapshot.revision;
        self.last_event = None;
    }

    fn apply(&mut self, event: MatchUpdatedEvent) -> bool {
        if event.revision <= self.revision || !self.accepts(&event) {
            return false;
        }
        self.revision = event.revision;
        self.last_event = Some(event.kind);
        self.current = Some(event.snapshot);
        true
    }

    fn revision(&self) -> u64 {
        self.revision
    }
}

/// Current-match store driven by `match-updated` deltas.
pub type MatchStore = SyncedStore<MatchMirror>;
