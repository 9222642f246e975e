//! Mirror of the waiting queue.

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::{
    client::{ClientError, snapshot::SnapshotSource, store::{Mirror, SyncedStore}},
    dto::{
        queue::{QueueSnapshot, QueueUpdatedEvent, TeamSummary},
        ws::EVENT_QUEUE_UPDATED,
    },
    error::ErrorScope,
    state::queue::QueueEventKind,
};

/// Local replica of the queue.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueMirror {
    /// Queue contents at `snapshot.revision`.
    pub snapshot: QueueSnapshot,
    /// Kind of the last applied delta, `None` right after a snapshot.
    pub last_event: Option<QueueEventKind>,
}

impl QueueMirror {
    /// Waiting teams in queue order.
    pub fn teams(&self) -> &[TeamSummary] {
        &self.snapshot.teams
    }

    /// Look up a waiting team.
    pub fn team(&self, team_id: Uuid) -> Option<&TeamSummary> {
        self.snapshot.teams.iter().find(|team| team.id == team_id)
    }

    /// 1-based position of a waiting team.
    pub fn position_of(&self, team_id: Uuid) -> Option<usize> {
        self.team(team_id).and_then(|team| team.position)
    }

    pub fn is_full(&self) -> bool {
        self.snapshot.available_slots == 0 && self.snapshot.capacity > 0
    }

    /// The two teams that the next promotion would put on court.
    pub fn next_up(&self) -> &[TeamSummary] {
        let end = self.snapshot.teams.len().min(2);
        &self.snapshot.teams[..end]
    }
}

impl Mirror for QueueMirror {
    type Snapshot = QueueSnapshot;
    type Delta = QueueUpdatedEvent;

    const EVENT: &'static str = EVENT_QUEUE_UPDATED;
    const SCOPE: ErrorScope = ErrorScope::Queue;

    fn fetch(source: &dyn SnapshotSource) -> BoxFuture<'static, Result<QueueSnapshot, ClientError>> {
        source.fetch_queue()
    }

    fn replace(&mut self, snapshot: QueueSnapshot) {
        self.snapshot = snapshot;
        self.last_event = None;
    }

    fn apply(&mut self, delta: QueueUpdatedEvent) -> bool {
        if delta.queue.revision <= self.snapshot.revision {
            return false;
        }
        self.snapshot = delta.queue;
        self.last_event = Some(delta.kind);
        true
    }

    fn revision(&self) -> u64 {
        self.snapshot.revision
    }
}

/// Queue store driven by `queue-updated` deltas.
pub type QueueStore = SyncedStore<QueueMirror>;

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use super::*;
    use crate::state::team::TeamStatus;

    fn summary(name: &str, position: usize) -> TeamSummary {
        TeamSummary {
            id: Uuid::new_v4(),
            name: name.into(),
            members: 4,
            contact_info: None,
            status: TeamStatus::Waiting,
            wins: 0,
            position: Some(position),
            joined_at: OffsetDateTime::UNIX_EPOCH,
            last_seen: OffsetDateTime::UNIX_EPOCH,
        }
    }

    fn event(kind: QueueEventKind, revision: u64, teams: Vec<TeamSummary>) -> QueueUpdatedEvent {
        QueueUpdatedEvent {
            kind,
            team_ids: Vec::new(),
            queue: QueueSnapshot {
                total_teams: teams.len(),
                available_slots: 3 - teams.len(),
                capacity: 3,
                teams,
                revision,
            },
        }
    }

    #[test]
    fn stale_and_duplicate_deltas_are_dropped() {
        let mut mirror = QueueMirror::default();
        let alpha = summary("Alpha", 1);

        assert!(mirror.apply(event(QueueEventKind::TeamJoined, 2, vec![alpha.clone()])));
        assert!(!mirror.apply(event(QueueEventKind::TeamJoined, 2, vec![alpha.clone()])));
        assert!(!mirror.apply(event(QueueEventKind::TeamRemoved, 1, Vec::new())));

        assert_eq!(mirror.revision(), 2);
        assert_eq!(mirror.position_of(alpha.id), Some(1));
        assert_eq!(mirror.last_event, Some(QueueEventKind::TeamJoined));
    }

    #[test]
    fn snapshot_resets_last_event() {
        let mut mirror = QueueMirror::default();
        mirror.apply(event(QueueEventKind::TeamJoined, 1, vec![summary("Alpha", 1)]));
        mirror.replace(QueueSnapshot {
            revision: 4,
            capacity: 3,
            available_slots: 3,
            ..QueueSnapshot::default()
        });

        assert_eq!(mirror.last_event, None);
        assert!(mirror.teams().is_empty());
        assert!(!mirror.is_full());
    }

    #[test]
    fn next_up_is_the_queue_head() {
        let mut mirror = QueueMirror::default();
        let teams = vec![summary("Alpha", 1), summary("Beta", 2), summary("Gamma", 3)];
        mirror.apply(event(QueueEventKind::TeamJoined, 1, teams));

        let names: Vec<_> = mirror.next_up().iter().map(|team| team.name.as_str()).collect();
        assert_eq!(names, ["Alpha", "Beta"]);
        assert!(mirror.is_full());
    }
}
