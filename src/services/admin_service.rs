//! Business logic powering the admin REST routes. Every mutation goes through
//! the authority so admin actions are ordered with client actions.

use tracing::info;
use uuid::Uuid;

use crate::{
    dto::{
        admin::{
            CourtUpdateRequest, EvictedTeamResponse, ForceResolveRequest, MatchHistoryResponse,
            ScoreUpdateRequest,
        },
        court::CourtStatusPayload,
        matches::MatchSnapshot,
    },
    error::ServiceError,
    state::SharedState,
};

/// Actor recorded when an eviction does not name one.
const DEFAULT_ACTOR: &str = "admin";

/// Start the next match with the two earliest teams.
pub async fn promote_next(state: &SharedState) -> Result<MatchSnapshot, ServiceError> {
    state
        .run_action(|authority, now| authority.promote(now))
        .await
        .map(MatchSnapshot::from)
}

/// Remove a waiting or resting team.
pub async fn evict_team(
    state: &SharedState,
    team_id: Uuid,
    actor: Option<String>,
) -> Result<EvictedTeamResponse, ServiceError> {
    let actor = actor
        .map(|actor| actor.trim().to_owned())
        .filter(|actor| !actor.is_empty())
        .unwrap_or_else(|| DEFAULT_ACTOR.to_owned());

    let team = state
        .run_action(|authority, _| authority.evict(team_id, &actor))
        .await?;
    Ok(EvictedTeamResponse { team: team.into() })
}

/// Adjust one side's score of the current match.
pub async fn update_score(
    state: &SharedState,
    match_id: Uuid,
    request: ScoreUpdateRequest,
) -> Result<MatchSnapshot, ServiceError> {
    if request.delta == 0 {
        return Err(ServiceError::InvalidInput(
            "score delta must not be zero".into(),
        ));
    }
    let side = request.side();

    state
        .run_action(|authority, now| authority.update_score(match_id, side, request.delta, now))
        .await
        .map(MatchSnapshot::from)
}

/// Resolve a match by admin decision, whatever its confirmations say.
pub async fn force_resolve(
    state: &SharedState,
    match_id: Uuid,
    request: ForceResolveRequest,
) -> Result<MatchSnapshot, ServiceError> {
    let ForceResolveRequest { actor, final_score } = request;
    let actor = actor.trim().to_owned();

    state
        .run_action(|authority, now| authority.force_resolve(match_id, actor, final_score, now))
        .await
        .map(MatchSnapshot::from)
}

/// Open or close the court, or switch its mode.
pub async fn update_court(
    state: &SharedState,
    request: CourtUpdateRequest,
) -> Result<CourtStatusPayload, ServiceError> {
    if request.is_open.is_none() && request.mode.is_none() {
        return Err(ServiceError::InvalidInput(
            "court update must set `isOpen` or `mode`".into(),
        ));
    }

    let config = state.config();
    let payload = state
        .run_action(|authority, now| {
            let (snapshot, deltas) = authority.set_court(request.is_open, request.mode, now);
            Ok((
                CourtStatusPayload::from_snapshot(snapshot, now, &config.timezone),
                deltas,
            ))
        })
        .await?;
    info!(is_open = payload.is_open, mode = ?payload.mode, "court updated by admin");
    Ok(payload)
}

/// Finished matches, newest first.
pub async fn match_history(state: &SharedState) -> MatchHistoryResponse {
    let matches = state
        .read(|authority, _| authority.history())
        .await
        .into_iter()
        .map(MatchSnapshot::from)
        .collect();
    MatchHistoryResponse { matches }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        dto::ws::JoinQueueRequest,
        services::queue_service,
        state::{AppState, court::CourtMode, match_machine::MatchStatus},
    };

    async fn admit(state: &SharedState, name: &str) -> Uuid {
        queue_service::join_queue(
            state,
            JoinQueueRequest {
                team_name: name.into(),
                members: 2,
                contact_info: None,
            },
        )
        .await
        .unwrap()
        .team
        .id
    }

    fn manual_config() -> AppConfig {
        AppConfig {
            auto_start: false,
            target_score: 3,
            ..AppConfig::default()
        }
    }

    #[tokio::test]
    async fn promote_requires_two_waiting_teams() {
        let state = AppState::new(manual_config());
        admit(&state, "Alpha").await;
        assert!(matches!(
            promote_next(&state).await.unwrap_err(),
            ServiceError::InvalidState(_)
        ));

        admit(&state, "Beta").await;
        let started = promote_next(&state).await.unwrap();
        assert_eq!(started.status, MatchStatus::Active);
        assert_eq!(started.team1.name, "Alpha");
    }

    #[tokio::test]
    async fn score_then_force_resolve_lands_in_history() {
        let state = AppState::new(manual_config());
        admit(&state, "Alpha").await;
        admit(&state, "Beta").await;
        let started = promote_next(&state).await.unwrap();

        let scored = update_score(
            &state,
            started.id,
            ScoreUpdateRequest { team: 2, delta: 1 },
        )
        .await
        .unwrap();
        assert_eq!(scored.score2, 1);

        let resolved = force_resolve(
            &state,
            started.id,
            ForceResolveRequest {
                actor: " referee ".into(),
                final_score: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(resolved.status, MatchStatus::Completed);
        assert_eq!(resolved.resolved_by.as_deref(), Some("referee"));

        let history = match_history(&state).await;
        assert_eq!(history.matches.len(), 1);
        assert_eq!(history.matches[0].id, started.id);
    }

    #[tokio::test]
    async fn zero_delta_is_rejected() {
        let state = AppState::new(manual_config());
        let err = update_score(&state, Uuid::new_v4(), ScoreUpdateRequest { team: 1, delta: 0 })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn eviction_defaults_the_actor() {
        let state = AppState::new(manual_config());
        let team_id = admit(&state, "Alpha").await;

        let evicted = evict_team(&state, team_id, Some("  ".into())).await.unwrap();
        assert_eq!(evicted.team.id, team_id);
        assert!(matches!(
            evict_team(&state, team_id, None).await.unwrap_err(),
            ServiceError::TeamNotFound(_)
        ));
    }

    #[tokio::test]
    async fn court_update_needs_a_field_and_applies_mode() {
        let state = AppState::new(manual_config());
        assert!(
            update_court(
                &state,
                CourtUpdateRequest {
                    is_open: None,
                    mode: None
                }
            )
            .await
            .is_err()
        );

        let payload = update_court(
            &state,
            CourtUpdateRequest {
                is_open: Some(false),
                mode: Some(CourtMode::ChampionReturn),
            },
        )
        .await
        .unwrap();
        assert!(!payload.is_open);
        assert_eq!(payload.mode, CourtMode::ChampionReturn);
        assert_eq!(payload.revision, 1);
    }
}
