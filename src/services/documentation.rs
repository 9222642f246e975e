use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the court queue server.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::websocket::ws_handler,
        crate::routes::public::get_queue,
        crate::routes::public::get_current_match,
        crate::routes::public::get_court_status,
        crate::routes::admin::promote_next,
        crate::routes::admin::evict_team,
        crate::routes::admin::update_score,
        crate::routes::admin::force_resolve,
        crate::routes::admin::match_history,
        crate::routes::admin::update_court,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::common::ErrorPayload,
            crate::dto::common::Notification,
            crate::dto::queue::QueueSnapshot,
            crate::dto::queue::QueueUpdatedEvent,
            crate::dto::matches::CurrentMatchResponse,
            crate::dto::matches::MatchUpdatedEvent,
            crate::dto::court::CourtStatusPayload,
            crate::dto::admin::ScoreUpdateRequest,
            crate::dto::admin::ForceResolveRequest,
            crate::dto::admin::CourtUpdateRequest,
            crate::dto::ws::ClientMessage,
            crate::dto::ws::ServerMessage,
            crate::error::ErrorCode,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "public", description = "Snapshot endpoints used for catch-up"),
        (name = "admin", description = "Court administration"),
        (name = "realtime", description = "WebSocket protocol for queue, match and court events"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_admin_and_snapshot_paths() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/queue",
            "/api/matches/current",
            "/api/court/status",
            "/api/admin/matches/{id}/force-resolve",
            "/ws",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
