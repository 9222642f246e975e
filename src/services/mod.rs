/// Admin operations on the queue, matches and court.
pub mod admin_service;
/// Fan-out of authority deltas to the realtime rooms.
pub mod broadcast_events;
/// Periodic timer sweep.
pub mod clock_supervisor;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Result confirmation.
pub mod match_service;
/// Read-only snapshots for catch-up.
pub mod public_service;
/// Queue admission and withdrawal.
pub mod queue_service;
/// WebSocket connection and message handling service.
pub mod websocket_service;
