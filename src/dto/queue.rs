//! Queue payloads shared by the snapshot route and `queue-updated` events.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::state::{
    authority::QueueDelta,
    queue::{QueueEventKind, QueueView},
    team::{Team, TeamStatus},
};

/// Public projection of a team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TeamSummary {
    pub id: Uuid,
    pub name: String,
    pub members: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_info: Option<String>,
    pub status: TeamStatus,
    pub wins: u32,
    /// 1-based queue position, absent when the team is not waiting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
    #[serde(with = "time::serde::rfc3339")]
    pub joined_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_seen: OffsetDateTime,
}

impl From<(usize, Team)> for TeamSummary {
    fn from((position, team): (usize, Team)) -> Self {
        Self {
            position: Some(position),
            ..Self::from(team)
        }
    }
}

impl From<Team> for TeamSummary {
    fn from(team: Team) -> Self {
        Self {
            id: team.id,
            name: team.name,
            members: team.members,
            contact_info: team.contact_info,
            status: team.status,
            wins: team.wins,
            position: None,
            joined_at: team.joined_at,
            last_seen: team.last_seen,
        }
    }
}

/// Full queue contents at a given revision.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueueSnapshot {
    /// Waiting teams in queue order.
    pub teams: Vec<TeamSummary>,
    pub total_teams: usize,
    pub available_slots: usize,
    pub capacity: usize,
    /// Monotonic queue revision.
    pub revision: u64,
}

impl QueueSnapshot {
    /// Project an authority view.
    pub fn from_view(view: QueueView, revision: u64) -> Self {
        Self {
            teams: view.teams.into_iter().map(TeamSummary::from).collect(),
            total_teams: view.total_teams,
            available_slots: view.available_slots,
            capacity: view.capacity,
            revision,
        }
    }
}

/// Payload of the `queue-updated` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueueUpdatedEvent {
    /// What caused the change.
    pub kind: QueueEventKind,
    /// Identifiers of the teams the change is about.
    #[serde(default)]
    pub team_ids: Vec<Uuid>,
    #[serde(flatten)]
    pub queue: QueueSnapshot,
}

impl From<QueueDelta> for QueueUpdatedEvent {
    fn from(delta: QueueDelta) -> Self {
        Self {
            kind: delta.kind,
            team_ids: delta.teams.iter().map(|team| team.id).collect(),
            queue: QueueSnapshot::from_view(delta.view, delta.revision),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::queue::CourtQueue;

    #[test]
    fn queue_update_flattens_snapshot_fields() {
        let mut queue = CourtQueue::new(10);
        let alpha = Team::new("Alpha".into(), 4, None, OffsetDateTime::UNIX_EPOCH);
        queue.admit(alpha.clone()).unwrap();

        let event = QueueUpdatedEvent::from(QueueDelta {
            kind: QueueEventKind::TeamJoined,
            revision: 3,
            view: queue.view(),
            teams: vec![(&alpha).into()],
        });
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["kind"], "team_joined");
        assert_eq!(json["totalTeams"], 1);
        assert_eq!(json["availableSlots"], 9);
        assert_eq!(json["revision"], 3);
        assert_eq!(json["teams"][0]["position"], 1);
        assert_eq!(json["teams"][0]["status"], "waiting");

        let back: QueueUpdatedEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
