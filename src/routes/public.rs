use axum::{Json, Router, extract::State, routing::get};

use crate::{
    dto::{
        common::ApiResponse,
        court::CourtStatusPayload,
        matches::CurrentMatchResponse,
        queue::QueueSnapshot,
    },
    services::public_service,
    state::SharedState,
};

/// Snapshot endpoints clients use to catch up after (re)connecting.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/queue", get(get_queue))
        .route("/api/matches/current", get(get_current_match))
        .route("/api/court/status", get(get_court_status))
}

#[utoipa::path(
    get,
    path = "/api/queue",
    tag = "public",
    responses((status = 200, description = "Waiting teams in queue order", body = ApiResponse<QueueSnapshot>))
)]
/// Return the queue with recomputed positions and its revision.
pub async fn get_queue(State(state): State<SharedState>) -> Json<ApiResponse<QueueSnapshot>> {
    Json(ApiResponse::success(
        public_service::queue_snapshot(&state).await,
    ))
}

#[utoipa::path(
    get,
    path = "/api/matches/current",
    tag = "public",
    responses((status = 200, description = "Match on the court, if any", body = ApiResponse<CurrentMatchResponse>))
)]
/// Return the match on (or last on) the court.
pub async fn get_current_match(
    State(state): State<SharedState>,
) -> Json<ApiResponse<CurrentMatchResponse>> {
    Json(ApiResponse::success(
        public_service::current_match(&state).await,
    ))
}

#[utoipa::path(
    get,
    path = "/api/court/status",
    tag = "public",
    responses((status = 200, description = "Court status", body = ApiResponse<CourtStatusPayload>))
)]
/// Return whether the court is open, its mode and the server clock.
pub async fn get_court_status(
    State(state): State<SharedState>,
) -> Json<ApiResponse<CourtStatusPayload>> {
    Json(ApiResponse::success(
        public_service::court_status(&state).await,
    ))
}
