use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::state::{court::CourtMode, team::Team};

/// Lifecycle status of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    /// Scores may change.
    Active,
    /// Target reached; waiting for both teams to acknowledge the result.
    Confirming,
    /// Both teams agreed, or an admin force-resolved the match.
    Completed,
    /// Confirmations disagree.
    Disputed,
    /// The confirmation window elapsed and the authority resolved unilaterally.
    TimeoutResolved,
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MatchStatus::Active => "active",
            MatchStatus::Confirming => "confirming",
            MatchStatus::Completed => "completed",
            MatchStatus::Disputed => "disputed",
            MatchStatus::TimeoutResolved => "timeout_resolved",
        };
        f.write_str(label)
    }
}

/// Delta kinds emitted by match transitions. Exactly one per transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MatchEventKind {
    /// Two teams were promoted onto the court.
    MatchStarted,
    /// A score changed without reaching the target.
    ScoreUpdated,
    /// A score reached the target; confirmation begins.
    MatchEnded,
    /// One team confirmed, the other is still pending.
    ConfirmationReceived,
    /// Both teams confirmed the same result.
    MatchCompleted,
    /// Confirmations disagree.
    MatchDisputed,
    /// Confirmation window elapsed.
    MatchTimeoutResolved,
    /// An admin resolved the match.
    MatchForceResolved,
}

/// How a terminal match reached its outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Both teams confirmed.
    Agreed,
    /// Resolved by the authority after the confirmation window.
    Timeout,
    /// Resolved by an admin.
    Forced,
    /// Parked with conflicting confirmations.
    Disputed,
}

/// What to do with a match whose confirmations disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DisputePolicy {
    /// `disputed` is terminal; the court moves on and an admin resolves it from history.
    #[default]
    Park,
    /// The disputed match keeps the court until force-resolved or timed out.
    Hold,
}

/// Which of the two slots a team occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// First promoted team.
    Team1,
    /// Second promoted team.
    Team2,
}

/// Read-only reference a match holds to one of its teams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamRef {
    /// Team identifier.
    pub id: Uuid,
    /// Display name at promotion time.
    pub name: String,
}

impl From<&Team> for TeamRef {
    fn from(team: &Team) -> Self {
        Self {
            id: team.id,
            name: team.name.clone(),
        }
    }
}

/// Final score pair, team1 first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FinalScore {
    /// Score of the first team.
    pub team1: u32,
    /// Score of the second team.
    pub team2: u32,
}

/// Canonical match record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    /// Match identifier.
    pub id: Uuid,
    /// First team on court.
    pub team1: TeamRef,
    /// Second team on court.
    pub team2: TeamRef,
    /// Running score of the first team.
    pub score1: u32,
    /// Running score of the second team.
    pub score2: u32,
    /// Score that ends the match.
    pub target_score: u32,
    /// Court mode the match was started under.
    pub match_type: CourtMode,
    /// Current status.
    pub status: MatchStatus,
    /// Promotion time.
    pub started_at: OffsetDateTime,
    /// When the match reached a terminal status.
    pub ended_at: Option<OffsetDateTime>,
    /// Whether the first team confirmed the result.
    pub confirmed1: bool,
    /// Whether the second team confirmed the result.
    pub confirmed2: bool,
    /// End of the confirmation window while confirming.
    pub confirmation_deadline: Option<OffsetDateTime>,
    /// Result once resolved.
    pub final_score: Option<FinalScore>,
    /// Winner once resolved; `None` on ties and parked disputes.
    pub winner_id: Option<Uuid>,
    /// How the result was reached.
    pub resolution: Option<Resolution>,
    /// Admin identity for force-resolved matches.
    pub resolved_by: Option<String>,
}

impl Match {
    /// Side occupied by `team_id`, if it plays in this match.
    pub fn side_of(&self, team_id: &Uuid) -> Option<Side> {
        if self.team1.id == *team_id {
            Some(Side::Team1)
        } else if self.team2.id == *team_id {
            Some(Side::Team2)
        } else {
            None
        }
    }

    /// Current score as a pair.
    pub fn score(&self) -> FinalScore {
        FinalScore {
            team1: self.score1,
            team2: self.score2,
        }
    }

    /// Team still expected to confirm, if exactly one confirmation is missing.
    pub fn waiting_for(&self) -> Option<Uuid> {
        match (self.confirmed1, self.confirmed2) {
            (true, false) => Some(self.team2.id),
            (false, true) => Some(self.team1.id),
            _ => None,
        }
    }

    /// The losing team of a resolved match with a winner.
    pub fn loser_id(&self) -> Option<Uuid> {
        let winner = self.winner_id?;
        if winner == self.team1.id {
            Some(self.team2.id)
        } else {
            Some(self.team1.id)
        }
    }

    fn settle(&mut self, score: FinalScore, resolution: Resolution, now: OffsetDateTime) {
        self.score1 = score.team1;
        self.score2 = score.team2;
        self.final_score = Some(score);
        self.winner_id = match score.team1.cmp(&score.team2) {
            std::cmp::Ordering::Greater => Some(self.team1.id),
            std::cmp::Ordering::Less => Some(self.team2.id),
            std::cmp::Ordering::Equal => None,
        };
        self.resolution = Some(resolution);
        self.confirmation_deadline = None;
        self.ended_at = Some(now);
    }
}

/// Inputs that can be applied to a match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchInput {
    /// Adjust one side's score by `delta` (negative values correct mistakes).
    Score {
        /// Side to adjust.
        side: Side,
        /// Signed adjustment.
        delta: i32,
    },
    /// A team acknowledges (or rejects) the recorded result.
    Confirm {
        /// Submitting team.
        team_id: Uuid,
        /// Whether the team agrees.
        confirmed: bool,
        /// Score the team believes is final, if it sent one.
        final_score: Option<FinalScore>,
    },
    /// Confirmation window check.
    Expire,
    /// Administrative resolution.
    ForceResolve {
        /// Admin identity recorded for audit.
        actor: String,
        /// Overrides the recorded score when present.
        final_score: Option<FinalScore>,
    },
}

impl MatchInput {
    fn label(&self) -> &'static str {
        match self {
            MatchInput::Score { .. } => "score",
            MatchInput::Confirm { .. } => "confirm",
            MatchInput::Expire => "expire",
            MatchInput::ForceResolve { .. } => "force_resolve",
        }
    }
}

/// Error returned when an input cannot be applied from the current status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {input} cannot be applied while {from}")]
pub struct InvalidTransition {
    /// Status the match was in.
    pub from: MatchStatus,
    /// Rejected input.
    pub input: &'static str,
}

/// Rejections raised by the match state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchError {
    /// Confirmation submitted outside the confirmation window.
    #[error("match `{match_id}` is not confirming (status {status})")]
    NotConfirming {
        /// Targeted match.
        match_id: Uuid,
        /// Current status.
        status: MatchStatus,
    },
    /// Submitting team does not play in this match.
    #[error("team `{team_id}` is not part of match `{match_id}`")]
    TeamNotInMatch {
        /// Targeted match.
        match_id: Uuid,
        /// Offending team.
        team_id: Uuid,
    },
    /// Input not valid from the current status.
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
}

/// State machine driving a single match through result confirmation.
#[derive(Debug, Clone)]
pub struct MatchStateMachine {
    record: Match,
    confirmation_window: Duration,
    dispute_policy: DisputePolicy,
}

impl MatchStateMachine {
    /// Start a match between two promoted teams. Initial status is `active`, scores 0-0.
    pub fn start(
        team1: &Team,
        team2: &Team,
        target_score: u32,
        match_type: CourtMode,
        confirmation_window: Duration,
        dispute_policy: DisputePolicy,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            record: Match {
                id: Uuid::new_v4(),
                team1: team1.into(),
                team2: team2.into(),
                score1: 0,
                score2: 0,
                target_score,
                match_type,
                status: MatchStatus::Active,
                started_at: now,
                ended_at: None,
                confirmed1: false,
                confirmed2: false,
                confirmation_deadline: None,
                final_score: None,
                winner_id: None,
                resolution: None,
                resolved_by: None,
            },
            confirmation_window,
            dispute_policy,
        }
    }

    /// Wrap an archived record so it can still be force-resolved.
    pub fn resume(record: Match, confirmation_window: Duration, dispute_policy: DisputePolicy) -> Self {
        Self {
            record,
            confirmation_window,
            dispute_policy,
        }
    }

    /// Inspect the canonical record.
    pub fn record(&self) -> &Match {
        &self.record
    }

    /// Consume the machine, returning the record.
    pub fn into_record(self) -> Match {
        self.record
    }

    /// Current status.
    pub fn status(&self) -> MatchStatus {
        self.record.status
    }

    /// Whether the match no longer occupies the court.
    pub fn is_terminal(&self) -> bool {
        match self.record.status {
            MatchStatus::Completed | MatchStatus::TimeoutResolved => true,
            MatchStatus::Disputed => self.dispute_policy == DisputePolicy::Park,
            MatchStatus::Active | MatchStatus::Confirming => false,
        }
    }

    /// Whether the confirmation deadline has passed and [`MatchInput::Expire`] would resolve it.
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        let expirable = match self.record.status {
            MatchStatus::Confirming => true,
            MatchStatus::Disputed => self.dispute_policy == DisputePolicy::Hold,
            _ => false,
        };
        expirable
            && self
                .record
                .confirmation_deadline
                .is_some_and(|deadline| deadline <= now)
    }

    /// Apply an input, returning the emitted event kind or `None` for an idempotent no-op.
    pub fn apply(
        &mut self,
        input: MatchInput,
        now: OffsetDateTime,
    ) -> Result<Option<MatchEventKind>, MatchError> {
        let label = input.label();
        let status = self.record.status;
        let record = &mut self.record;

        let event = match (status, input) {
            (MatchStatus::Active, MatchInput::Score { side, delta }) => {
                let slot = match side {
                    Side::Team1 => &mut record.score1,
                    Side::Team2 => &mut record.score2,
                };
                let next = (i64::from(*slot) + i64::from(delta)).clamp(0, i64::from(u32::MAX));
                let next = u32::try_from(next).unwrap_or(u32::MAX);
                if next == *slot {
                    return Ok(None);
                }
                *slot = next;

                if record.score1 >= record.target_score || record.score2 >= record.target_score {
                    record.status = MatchStatus::Confirming;
                    record.confirmed1 = false;
                    record.confirmed2 = false;
                    record.confirmation_deadline = Some(now + self.confirmation_window);
                    MatchEventKind::MatchEnded
                } else {
                    MatchEventKind::ScoreUpdated
                }
            }
            (
                MatchStatus::Confirming,
                MatchInput::Confirm {
                    team_id,
                    confirmed,
                    final_score,
                },
            ) => {
                let side = record.side_of(&team_id).ok_or(MatchError::TeamNotInMatch {
                    match_id: record.id,
                    team_id,
                })?;
                let agrees = confirmed && final_score.is_none_or(|score| score == record.score());

                if !agrees {
                    record.status = MatchStatus::Disputed;
                    if self.dispute_policy == DisputePolicy::Park {
                        record.resolution = Some(Resolution::Disputed);
                        record.confirmation_deadline = None;
                        record.ended_at = Some(now);
                    }
                    MatchEventKind::MatchDisputed
                } else {
                    let flag = match side {
                        Side::Team1 => &mut record.confirmed1,
                        Side::Team2 => &mut record.confirmed2,
                    };
                    if *flag {
                        return Ok(None);
                    }
                    *flag = true;

                    if record.confirmed1 && record.confirmed2 {
                        let score = record.score();
                        record.status = MatchStatus::Completed;
                        record.settle(score, Resolution::Agreed, now);
                        MatchEventKind::MatchCompleted
                    } else {
                        MatchEventKind::ConfirmationReceived
                    }
                }
            }
            (_, MatchInput::Confirm { team_id, .. }) => {
                if record.side_of(&team_id).is_none() {
                    return Err(MatchError::TeamNotInMatch {
                        match_id: record.id,
                        team_id,
                    });
                }
                return Err(MatchError::NotConfirming {
                    match_id: record.id,
                    status,
                });
            }
            (MatchStatus::Confirming | MatchStatus::Disputed, MatchInput::Expire)
                if status == MatchStatus::Confirming
                    || self.dispute_policy == DisputePolicy::Hold =>
            {
                let due = record
                    .confirmation_deadline
                    .is_some_and(|deadline| deadline <= now);
                if !due {
                    return Ok(None);
                }
                let score = record.score();
                record.status = MatchStatus::TimeoutResolved;
                record.settle(score, Resolution::Timeout, now);
                MatchEventKind::MatchTimeoutResolved
            }
            (from, MatchInput::ForceResolve { actor, final_score })
                if from != MatchStatus::Completed =>
            {
                let score = final_score.unwrap_or(record.score());
                record.status = MatchStatus::Completed;
                record.settle(score, Resolution::Forced, now);
                record.resolved_by = Some(actor);
                MatchEventKind::MatchForceResolved
            }
            (from, _) => {
                return Err(MatchError::InvalidTransition(InvalidTransition {
                    from,
                    input: label,
                }));
            }
        };

        Ok(Some(event))
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);

    fn start(policy: DisputePolicy) -> (MatchStateMachine, Uuid, Uuid) {
        let now = datetime!(2024-05-01 18:00 UTC);
        let alpha = Team::new("Alpha".into(), 4, None, now);
        let beta = Team::new("Beta".into(), 4, None, now);
        let sm = MatchStateMachine::start(
            &alpha,
            &beta,
            21,
            CourtMode::Regular,
            WINDOW,
            policy,
            now,
        );
        (sm, alpha.id, beta.id)
    }

    fn now() -> OffsetDateTime {
        datetime!(2024-05-01 18:10 UTC)
    }

    fn score(sm: &mut MatchStateMachine, side: Side, delta: i32) -> Option<MatchEventKind> {
        sm.apply(MatchInput::Score { side, delta }, now()).unwrap()
    }

    fn confirm(sm: &mut MatchStateMachine, team_id: Uuid, confirmed: bool) -> Option<MatchEventKind> {
        sm.apply(
            MatchInput::Confirm {
                team_id,
                confirmed,
                final_score: None,
            },
            now(),
        )
        .unwrap()
    }

    #[test]
    fn new_match_is_active_at_zero() {
        let (sm, alpha, beta) = start(DisputePolicy::Park);
        let record = sm.record();
        assert_eq!(record.status, MatchStatus::Active);
        assert_eq!((record.score1, record.score2), (0, 0));
        assert_eq!(record.target_score, 21);
        assert_eq!(record.team1.id, alpha);
        assert_eq!(record.team2.id, beta);
    }

    #[test]
    fn scores_below_target_emit_score_updated() {
        let (mut sm, _, _) = start(DisputePolicy::Park);
        assert_eq!(score(&mut sm, Side::Team1, 5), Some(MatchEventKind::ScoreUpdated));
        assert_eq!(score(&mut sm, Side::Team1, -10), Some(MatchEventKind::ScoreUpdated));
        assert_eq!(sm.record().score1, 0);
        assert_eq!(score(&mut sm, Side::Team1, -1), None);
    }

    #[test]
    fn reaching_target_enters_confirming_then_completes() {
        let (mut sm, alpha, beta) = start(DisputePolicy::Park);
        assert_eq!(score(&mut sm, Side::Team2, 15), Some(MatchEventKind::ScoreUpdated));
        assert_eq!(score(&mut sm, Side::Team1, 21), Some(MatchEventKind::MatchEnded));
        assert_eq!(sm.status(), MatchStatus::Confirming);
        assert!(!sm.record().confirmed1 && !sm.record().confirmed2);
        assert_eq!(sm.record().confirmation_deadline, Some(now() + WINDOW));

        assert_eq!(confirm(&mut sm, alpha, true), Some(MatchEventKind::ConfirmationReceived));
        assert!(sm.record().confirmed1 && !sm.record().confirmed2);
        assert_eq!(sm.status(), MatchStatus::Confirming);
        assert_eq!(sm.record().waiting_for(), Some(beta));

        assert_eq!(confirm(&mut sm, beta, true), Some(MatchEventKind::MatchCompleted));
        let record = sm.record();
        assert_eq!(record.status, MatchStatus::Completed);
        assert_eq!(record.winner_id, Some(alpha));
        assert_eq!(record.resolution, Some(Resolution::Agreed));
        assert_eq!(record.final_score, Some(FinalScore { team1: 21, team2: 15 }));
        assert!(sm.is_terminal());
    }

    #[test]
    fn repeated_confirmation_is_a_no_op() {
        let (mut sm, alpha, _) = start(DisputePolicy::Park);
        score(&mut sm, Side::Team1, 21);
        confirm(&mut sm, alpha, true);
        let once = sm.record().clone();

        assert_eq!(confirm(&mut sm, alpha, true), None);
        assert_eq!(sm.record(), &once);
    }

    #[test]
    fn rejection_disputes_and_parks() {
        let (mut sm, alpha, beta) = start(DisputePolicy::Park);
        score(&mut sm, Side::Team1, 21);
        confirm(&mut sm, alpha, true);
        assert_eq!(confirm(&mut sm, beta, false), Some(MatchEventKind::MatchDisputed));
        assert_eq!(sm.status(), MatchStatus::Disputed);
        assert_eq!(sm.record().resolution, Some(Resolution::Disputed));
        assert!(sm.is_terminal());
    }

    #[test]
    fn conflicting_final_score_disputes() {
        let (mut sm, alpha, _) = start(DisputePolicy::Park);
        score(&mut sm, Side::Team1, 21);
        let event = sm
            .apply(
                MatchInput::Confirm {
                    team_id: alpha,
                    confirmed: true,
                    final_score: Some(FinalScore { team1: 21, team2: 19 }),
                },
                now(),
            )
            .unwrap();
        assert_eq!(event, Some(MatchEventKind::MatchDisputed));
    }

    #[test]
    fn held_dispute_stays_on_court_until_timeout() {
        let (mut sm, alpha, _) = start(DisputePolicy::Hold);
        score(&mut sm, Side::Team2, 21);
        confirm(&mut sm, alpha, false);
        assert!(!sm.is_terminal());

        let later = now() + WINDOW;
        assert!(sm.is_expired(later));
        assert_eq!(
            sm.apply(MatchInput::Expire, later).unwrap(),
            Some(MatchEventKind::MatchTimeoutResolved)
        );
        assert_eq!(sm.status(), MatchStatus::TimeoutResolved);
    }

    #[test]
    fn expire_resolves_with_score_frozen_at_confirming() {
        let (mut sm, _, beta) = start(DisputePolicy::Park);
        score(&mut sm, Side::Team1, 12);
        score(&mut sm, Side::Team2, 21);

        assert_eq!(sm.apply(MatchInput::Expire, now()).unwrap(), None);
        assert_eq!(sm.status(), MatchStatus::Confirming);

        let deadline = now() + WINDOW;
        assert_eq!(
            sm.apply(MatchInput::Expire, deadline).unwrap(),
            Some(MatchEventKind::MatchTimeoutResolved)
        );
        let record = sm.record();
        assert_eq!(record.final_score, Some(FinalScore { team1: 12, team2: 21 }));
        assert_eq!(record.winner_id, Some(beta));
        assert_eq!(record.resolution, Some(Resolution::Timeout));
    }

    #[test]
    fn confirming_an_active_match_is_rejected() {
        let (mut sm, alpha, _) = start(DisputePolicy::Park);
        let err = sm
            .apply(
                MatchInput::Confirm {
                    team_id: alpha,
                    confirmed: true,
                    final_score: None,
                },
                now(),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            MatchError::NotConfirming {
                status: MatchStatus::Active,
                ..
            }
        ));
    }

    #[test]
    fn outsider_confirmation_is_rejected_without_change() {
        let (mut sm, _, _) = start(DisputePolicy::Park);
        score(&mut sm, Side::Team1, 21);
        let before = sm.record().clone();

        let err = sm
            .apply(
                MatchInput::Confirm {
                    team_id: Uuid::new_v4(),
                    confirmed: true,
                    final_score: None,
                },
                now(),
            )
            .unwrap_err();
        assert!(matches!(err, MatchError::TeamNotInMatch { .. }));
        assert_eq!(sm.record(), &before);
    }

    #[test]
    fn force_resolve_from_any_open_status_records_actor() {
        let (mut sm, _, beta) = start(DisputePolicy::Park);
        score(&mut sm, Side::Team1, 3);
        let event = sm
            .apply(
                MatchInput::ForceResolve {
                    actor: "referee".into(),
                    final_score: Some(FinalScore { team1: 18, team2: 21 }),
                },
                now(),
            )
            .unwrap();
        assert_eq!(event, Some(MatchEventKind::MatchForceResolved));
        let record = sm.record();
        assert_eq!(record.status, MatchStatus::Completed);
        assert_eq!(record.resolved_by.as_deref(), Some("referee"));
        assert_eq!(record.winner_id, Some(beta));
        assert_eq!((record.score1, record.score2), (18, 21));
    }

    #[test]
    fn completed_match_cannot_be_forced_again() {
        let (mut sm, _, _) = start(DisputePolicy::Park);
        sm.apply(
            MatchInput::ForceResolve {
                actor: "referee".into(),
                final_score: None,
            },
            now(),
        )
        .unwrap();
        let err = sm
            .apply(
                MatchInput::ForceResolve {
                    actor: "referee".into(),
                    final_score: None,
                },
                now(),
            )
            .unwrap_err();
        assert!(matches!(err, MatchError::InvalidTransition(_)));
    }

    #[test]
    fn scoring_outside_active_is_invalid() {
        let (mut sm, _, _) = start(DisputePolicy::Park);
        score(&mut sm, Side::Team1, 21);
        let err = sm
            .apply(
                MatchInput::Score {
                    side: Side::Team2,
                    delta: 1,
                },
                now(),
            )
            .unwrap_err();
        assert_eq!(
            err,
            MatchError::InvalidTransition(InvalidTransition {
                from: MatchStatus::Confirming,
                input: "score",
            })
        );
    }
}
