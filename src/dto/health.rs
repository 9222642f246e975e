use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Health status ("ok").
    pub status: String,
    /// Number of open realtime connections.
    pub connections: usize,
    /// Seconds since the server started.
    pub uptime_secs: u64,
}

impl HealthResponse {
    /// Create a health response indicating the system is operational.
    pub fn ok(connections: usize, uptime_secs: u64) -> Self {
        Self {
            status: "ok".to_string(),
            connections,
            uptime_secs,
        }
    }
}
