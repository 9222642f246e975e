//! Match payloads shared by the snapshot route and `match-updated` events.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::state::{
    authority::MatchDelta,
    court::CourtMode,
    match_machine::{FinalScore, Match, MatchEventKind, MatchStatus, Resolution, TeamRef},
};

/// Team reference embedded in a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MatchTeam {
    pub id: Uuid,
    pub name: String,
}

impl From<TeamRef> for MatchTeam {
    fn from(team: TeamRef) -> Self {
        Self {
            id: team.id,
            name: team.name,
        }
    }
}

/// Full match state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MatchSnapshot {
    pub id: Uuid,
    pub team1: MatchTeam,
    pub team2: MatchTeam,
    pub score1: u32,
    pub score2: u32,
    pub target_score: u32,
    pub match_type: CourtMode,
    pub status: MatchStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub ended_at: Option<OffsetDateTime>,
    pub confirmed1: bool,
    pub confirmed2: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub confirmation_deadline: Option<OffsetDateTime>,
    #[serde(default)]
    pub final_score: Option<FinalScore>,
    #[serde(default)]
    pub winner_id: Option<Uuid>,
    #[serde(default)]
    pub resolution: Option<Resolution>,
    #[serde(default)]
    pub resolved_by: Option<String>,
}

impl MatchSnapshot {
    /// Whether the match no longer occupies the court.
    ///
    /// A disputed match carries a `resolution` only when it was parked.
    pub fn is_terminal(&self) -> bool {
        match self.status {
            MatchStatus::Completed | MatchStatus::TimeoutResolved => true,
            MatchStatus::Disputed => self.resolution.is_some(),
            MatchStatus::Active | MatchStatus::Confirming => false,
        }
    }

    fn team(&self, team_id: Uuid) -> Option<&MatchTeam> {
        [&self.team1, &self.team2]
            .into_iter()
            .find(|team| team.id == team_id)
    }
}

impl From<Match> for MatchSnapshot {
    fn from(record: Match) -> Self {
        Self {
            id: record.id,
            team1: record.team1.into(),
            team2: record.team2.into(),
            score1: record.score1,
            score2: record.score2,
            target_score: record.target_score,
            match_type: record.match_type,
            status: record.status,
            started_at: record.started_at,
            ended_at: record.ended_at,
            confirmed1: record.confirmed1,
            confirmed2: record.confirmed2,
            confirmation_deadline: record.confirmation_deadline,
            final_score: record.final_score,
            winner_id: record.winner_id,
            resolution: record.resolution,
            resolved_by: record.resolved_by,
        }
    }
}

/// Payload of `GET /api/matches/current`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
pub struct CurrentMatchResponse {
    /// Match on the court, or the last finished one until the next starts.
    #[serde(rename = "match")]
    pub current: Option<MatchSnapshot>,
    /// Monotonic match revision.
    pub revision: u64,
}

/// Payload of the `match-updated` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MatchUpdatedEvent {
    pub kind: MatchEventKind,
    pub revision: u64,
    #[serde(rename = "match")]
    pub snapshot: MatchSnapshot,
    /// Running score, on score changes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<FinalScore>,
    /// Winning team once resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<MatchTeam>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_score: Option<FinalScore>,
    /// Team that still has to confirm.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waiting_for: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
    /// Update about a match already moved to history; it does not replace the current one.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub archived: bool,
}

impl From<MatchDelta> for MatchUpdatedEvent {
    fn from(delta: MatchDelta) -> Self {
        let waiting_for = delta.record.waiting_for();
        let snapshot = MatchSnapshot::from(delta.record);
        let resolved = matches!(
            delta.kind,
            MatchEventKind::MatchCompleted
                | MatchEventKind::MatchTimeoutResolved
                | MatchEventKind::MatchForceResolved
        );

        Self {
            kind: delta.kind,
            revision: delta.revision,
            score: matches!(
                delta.kind,
                MatchEventKind::ScoreUpdated | MatchEventKind::MatchEnded
            )
            .then(|| FinalScore {
                team1: snapshot.score1,
                team2: snapshot.score2,
            }),
            winner: snapshot
                .winner_id
                .filter(|_| resolved)
                .and_then(|id| snapshot.team(id).cloned()),
            final_score: snapshot.final_score.filter(|_| resolved),
            waiting_for: (delta.kind == MatchEventKind::ConfirmationReceived)
                .then_some(waiting_for)
                .flatten(),
            resolved_by: snapshot
                .resolved_by
                .clone()
                .filter(|_| delta.kind == MatchEventKind::MatchForceResolved),
            archived: delta.archived,
            snapshot,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::state::{
        match_machine::{DisputePolicy, MatchInput, MatchStateMachine, Side},
        team::Team,
    };

    fn machine() -> MatchStateMachine {
        let now = OffsetDateTime::UNIX_EPOCH;
        let alpha = Team::new("Alpha".into(), 4, None, now);
        let beta = Team::new("Beta".into(), 4, None, now);
        MatchStateMachine::start(
            &alpha,
            &beta,
            21,
            CourtMode::Regular,
            Duration::from_secs(60),
            DisputePolicy::Park,
            now,
        )
    }

    #[test]
    fn confirmation_event_names_the_pending_team() {
        let mut sm = machine();
        let now = OffsetDateTime::UNIX_EPOCH;
        sm.apply(MatchInput::Score { side: Side::Team1, delta: 21 }, now).unwrap();
        let team1 = sm.record().team1.id;
        let team2 = sm.record().team2.id;
        let kind = sm
            .apply(
                MatchInput::Confirm {
                    team_id: team1,
                    confirmed: true,
                    final_score: None,
                },
                now,
            )
            .unwrap()
            .unwrap();

        let event = MatchUpdatedEvent::from(MatchDelta {
            kind,
            revision: 4,
            record: sm.record().clone(),
            archived: false,
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "confirmation_received");
        assert_eq!(json["waitingFor"], team2.to_string());
        assert_eq!(json["match"]["status"], "confirming");
        assert_eq!(json["match"]["confirmed1"], true);
        assert!(json.get("winner").is_none());
        assert!(json.get("archived").is_none());
    }

    #[test]
    fn completed_event_carries_winner_and_final_score() {
        let mut sm = machine();
        let now = OffsetDateTime::UNIX_EPOCH;
        sm.apply(MatchInput::Score { side: Side::Team2, delta: 21 }, now).unwrap();
        let kind = sm
            .apply(
                MatchInput::ForceResolve {
                    actor: "referee".into(),
                    final_score: None,
                },
                now,
            )
            .unwrap()
            .unwrap();

        let event = MatchUpdatedEvent::from(MatchDelta {
            kind,
            revision: 9,
            record: sm.record().clone(),
            archived: false,
        });
        assert_eq!(event.winner.as_ref().map(|team| team.name.as_str()), Some("Beta"));
        assert_eq!(event.final_score, Some(FinalScore { team1: 0, team2: 21 }));
        assert_eq!(event.resolved_by.as_deref(), Some("referee"));
        assert!(event.snapshot.is_terminal());

        let json = serde_json::to_string(&event).unwrap();
        let back: MatchUpdatedEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
