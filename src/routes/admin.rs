use axum::{
    Json, Router,
    body::Body,
    extract::{Path, Query, State},
    http::Request,
    middleware::{self, Next},
    response::Response,
    routing::{delete, get, post, put},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::{
        admin::{
            CourtUpdateRequest, EvictQuery, EvictedTeamResponse, ForceResolveRequest,
            MatchHistoryResponse, ScoreUpdateRequest,
        },
        common::ApiResponse,
        court::CourtStatusPayload,
        matches::MatchSnapshot,
    },
    error::AppError,
    services::admin_service,
    state::SharedState,
};

const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Admin-only endpoints driving the court.
pub fn router(state: SharedState) -> Router<SharedState> {
    Router::new()
        .route("/api/admin/queue/promote", post(promote_next))
        .route("/api/admin/queue/{team_id}", delete(evict_team))
        .route("/api/admin/matches/{id}/score", post(update_score))
        .route("/api/admin/matches/{id}/force-resolve", post(force_resolve))
        .route("/api/admin/matches/history", get(match_history))
        .route("/api/admin/court", put(update_court))
        .route_layer(middleware::from_fn_with_state(state, require_admin_token))
}

/// Start the next match with the two earliest waiting teams.
#[utoipa::path(
    post,
    path = "/api/admin/queue/promote",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Configured admin token")),
    responses(
        (status = 200, description = "Match started", body = ApiResponse<MatchSnapshot>),
        (status = 409, description = "Court closed, busy or fewer than two teams waiting")
    )
)]
pub async fn promote_next(
    State(state): State<SharedState>,
) -> Result<Json<ApiResponse<MatchSnapshot>>, AppError> {
    let started = admin_service::promote_next(&state).await?;
    Ok(Json(ApiResponse::success(started)))
}

/// Remove a waiting or resting team from the queue.
#[utoipa::path(
    delete,
    path = "/api/admin/queue/{team_id}",
    tag = "admin",
    params(
        ("X-Admin-Token" = String, Header, description = "Configured admin token"),
        ("team_id" = Uuid, Path, description = "Identifier of the team to evict"),
        EvictQuery
    ),
    responses(
        (status = 200, description = "Team evicted", body = ApiResponse<EvictedTeamResponse>),
        (status = 404, description = "Unknown team")
    )
)]
pub async fn evict_team(
    State(state): State<SharedState>,
    Path(team_id): Path<Uuid>,
    Valid(Query(query)): Valid<Query<EvictQuery>>,
) -> Result<Json<ApiResponse<EvictedTeamResponse>>, AppError> {
    let evicted = admin_service::evict_team(&state, team_id, query.actor).await?;
    Ok(Json(ApiResponse::success(evicted)))
}

/// Adjust one side's score of the current match.
#[utoipa::path(
    post,
    path = "/api/admin/matches/{id}/score",
    tag = "admin",
    params(
        ("X-Admin-Token" = String, Header, description = "Configured admin token"),
        ("id" = Uuid, Path, description = "Identifier of the current match")
    ),
    request_body = ScoreUpdateRequest,
    responses(
        (status = 200, description = "Score updated", body = ApiResponse<MatchSnapshot>),
        (status = 404, description = "Not the current match"),
        (status = 409, description = "Match is no longer active")
    )
)]
pub async fn update_score(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<ScoreUpdateRequest>>,
) -> Result<Json<ApiResponse<MatchSnapshot>>, AppError> {
    let updated = admin_service::update_score(&state, id, payload).await?;
    Ok(Json(ApiResponse::success(updated)))
}

/// Resolve a match by admin decision.
#[utoipa::path(
    post,
    path = "/api/admin/matches/{id}/force-resolve",
    tag = "admin",
    params(
        ("X-Admin-Token" = String, Header, description = "Configured admin token"),
        ("id" = Uuid, Path, description = "Identifier of the current or an archived match")
    ),
    request_body = ForceResolveRequest,
    responses(
        (status = 200, description = "Match resolved", body = ApiResponse<MatchSnapshot>),
        (status = 404, description = "Unknown match"),
        (status = 409, description = "Match already completed")
    )
)]
pub async fn force_resolve(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<ForceResolveRequest>>,
) -> Result<Json<ApiResponse<MatchSnapshot>>, AppError> {
    let resolved = admin_service::force_resolve(&state, id, payload).await?;
    Ok(Json(ApiResponse::success(resolved)))
}

/// Finished matches, newest first.
#[utoipa::path(
    get,
    path = "/api/admin/matches/history",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Configured admin token")),
    responses((status = 200, description = "Match history", body = ApiResponse<MatchHistoryResponse>))
)]
pub async fn match_history(
    State(state): State<SharedState>,
) -> Json<ApiResponse<MatchHistoryResponse>> {
    Json(ApiResponse::success(
        admin_service::match_history(&state).await,
    ))
}

/// Open or close the court, or switch its mode.
#[utoipa::path(
    put,
    path = "/api/admin/court",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Configured admin token")),
    request_body = CourtUpdateRequest,
    responses(
        (status = 200, description = "Court updated", body = ApiResponse<CourtStatusPayload>),
        (status = 400, description = "Empty update")
    )
)]
pub async fn update_court(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<CourtUpdateRequest>>,
) -> Result<Json<ApiResponse<CourtStatusPayload>>, AppError> {
    let status = admin_service::update_court(&state, payload).await?;
    Ok(Json(ApiResponse::success(status)))
}

/// Reject requests that do not carry the configured admin token.
async fn require_admin_token(
    State(state): State<SharedState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let config = state.config();
    let Some(expected) = config.admin_token.as_deref() else {
        return Ok(next.run(req).await);
    };

    let provided = req
        .headers()
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::unauthorized("missing admin token header `X-Admin-Token`"))?;

    if provided == expected {
        Ok(next.run(req).await)
    } else {
        Err(AppError::unauthorized("invalid admin token"))
    }
}
