use tracing::debug;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Respond with liveness information about the authority.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let connections = state.connections().len();
    debug!(connections, "health check");
    HealthResponse::ok(connections, state.uptime_secs())
}
