use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::ValidationErrors;

use crate::{
    dto::common::{ApiResponse, ErrorPayload},
    state::match_machine::{MatchError, MatchStatus},
};

/// Machine-readable error codes shared by the REST envelope and the realtime `error` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Payload failed validation or the action is not allowed right now.
    ValidationError,
    /// Another active team already uses this display name.
    TeamNameExists,
    /// The queue reached its capacity.
    QueueFull,
    /// No active team carries the given identifier.
    TeamNotFound,
    /// The court is closed to new admissions.
    CourtClosed,
    /// No match carries the given identifier.
    MatchNotFound,
    /// The match is not awaiting result confirmation.
    MatchNotConfirming,
    /// The team does not play in the referenced match.
    TeamNotInMatch,
    /// Transport-level failure (client side).
    NetworkError,
    /// The connection sent too many actions in the current window.
    RateLimitExceeded,
    /// Missing or invalid admin credentials.
    Unauthorized,
    /// Unexpected failure inside the authority.
    InternalError,
}

/// Which client-side store an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorScope {
    /// Queue admission and withdrawal.
    Queue,
    /// Match protocol.
    Match,
    /// Court status.
    Court,
    /// Connection/session level, not tied to any store.
    Session,
}

impl ErrorCode {
    /// Classify the code so each store only surfaces its own errors.
    pub fn scope(self) -> ErrorScope {
        match self {
            ErrorCode::TeamNameExists | ErrorCode::QueueFull | ErrorCode::TeamNotFound => {
                ErrorScope::Queue
            }
            ErrorCode::MatchNotFound
            | ErrorCode::MatchNotConfirming
            | ErrorCode::TeamNotInMatch => ErrorScope::Match,
            ErrorCode::CourtClosed => ErrorScope::Court,
            ErrorCode::ValidationError
            | ErrorCode::NetworkError
            | ErrorCode::RateLimitExceeded
            | ErrorCode::Unauthorized
            | ErrorCode::InternalError => ErrorScope::Session,
        }
    }
}

/// Errors that can occur in service layer operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Operation cannot be performed in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Display name already taken by an active team.
    #[error("team name `{0}` is already in use")]
    TeamNameExists(String),
    /// Queue is at capacity.
    #[error("queue is full ({capacity} teams)")]
    QueueFull {
        /// Configured queue capacity.
        capacity: usize,
    },
    /// Team identifier unknown to the authority.
    #[error("team `{0}` not found")]
    TeamNotFound(Uuid),
    /// Court does not accept new teams.
    #[error("court is closed")]
    CourtClosed,
    /// Match identifier unknown to the authority.
    #[error("match `{0}` not found")]
    MatchNotFound(Uuid),
    /// Confirmation submitted outside the `confirming` window.
    #[error("match `{match_id}` is not awaiting confirmation (status {status})")]
    MatchNotConfirming {
        /// Targeted match.
        match_id: Uuid,
        /// Status the match was in.
        status: MatchStatus,
    },
    /// Team does not play in the match.
    #[error("team `{team_id}` is not part of match `{match_id}`")]
    TeamNotInMatch {
        /// Targeted match.
        match_id: Uuid,
        /// Offending team.
        team_id: Uuid,
    },
    /// Unauthorized access attempt.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Per-connection action budget exhausted.
    #[error("rate limit exceeded, retry in {retry_after_secs}s")]
    RateLimited {
        /// Seconds until the current window resets.
        retry_after_secs: u64,
    },
    /// Unexpected internal failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Wire code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            ServiceError::InvalidInput(_) | ServiceError::InvalidState(_) => {
                ErrorCode::ValidationError
            }
            ServiceError::TeamNameExists(_) => ErrorCode::TeamNameExists,
            ServiceError::QueueFull { .. } => ErrorCode::QueueFull,
            ServiceError::TeamNotFound(_) => ErrorCode::TeamNotFound,
            ServiceError::CourtClosed => ErrorCode::CourtClosed,
            ServiceError::MatchNotFound(_) => ErrorCode::MatchNotFound,
            ServiceError::MatchNotConfirming { .. } => ErrorCode::MatchNotConfirming,
            ServiceError::TeamNotInMatch { .. } => ErrorCode::TeamNotInMatch,
            ServiceError::Unauthorized(_) => ErrorCode::Unauthorized,
            ServiceError::RateLimited { .. } => ErrorCode::RateLimitExceeded,
            ServiceError::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Build the wire payload, tagging it with the action that caused it.
    pub fn to_payload(&self, action: Option<&str>) -> ErrorPayload {
        let details = action.map(|action| serde_json::json!({ "action": action }));
        ErrorPayload {
            code: self.code(),
            message: self.to_string(),
            details,
        }
    }
}

impl From<MatchError> for ServiceError {
    fn from(err: MatchError) -> Self {
        match err {
            MatchError::NotConfirming { match_id, status } => {
                ServiceError::MatchNotConfirming { match_id, status }
            }
            MatchError::TeamNotInMatch { match_id, team_id } => {
                ServiceError::TeamNotInMatch { match_id, team_id }
            }
            MatchError::InvalidTransition(invalid) => {
                ServiceError::InvalidState(invalid.to_string())
            }
        }
    }
}

impl From<ValidationErrors> for ServiceError {
    fn from(err: ValidationErrors) -> Self {
        ServiceError::InvalidInput(format!("validation failed: {}", err))
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::from(ServiceError::from(err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {}", .0.message)]
    BadRequest(ErrorPayload),
    /// Unauthorized access attempt.
    #[error("unauthorized: {}", .0.message)]
    Unauthorized(ErrorPayload),
    /// Requested resource not found.
    #[error("not found: {}", .0.message)]
    NotFound(ErrorPayload),
    /// Conflict with current state.
    #[error("conflict: {}", .0.message)]
    Conflict(ErrorPayload),
    /// Caller exceeded its action budget.
    #[error("too many requests: {}", .0.message)]
    TooManyRequests(ErrorPayload),
    /// Internal server error.
    #[error("internal error: {}", .0.message)]
    Internal(ErrorPayload),
}

impl AppError {
    /// Shortcut for a missing/invalid admin token.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        AppError::from(ServiceError::Unauthorized(message.into()))
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let payload = err.to_payload(None);
        match err {
            ServiceError::InvalidInput(_) => AppError::BadRequest(payload),
            ServiceError::Unauthorized(_) => AppError::Unauthorized(payload),
            ServiceError::TeamNotFound(_) | ServiceError::MatchNotFound(_) => {
                AppError::NotFound(payload)
            }
            ServiceError::InvalidState(_)
            | ServiceError::TeamNameExists(_)
            | ServiceError::QueueFull { .. }
            | ServiceError::CourtClosed
            | ServiceError::MatchNotConfirming { .. }
            | ServiceError::TeamNotInMatch { .. } => AppError::Conflict(payload),
            ServiceError::RateLimited { .. } => AppError::TooManyRequests(payload),
            ServiceError::Internal(_) => AppError::Internal(payload),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, payload) = match self {
            AppError::BadRequest(payload) => (StatusCode::BAD_REQUEST, payload),
            AppError::Unauthorized(payload) => (StatusCode::UNAUTHORIZED, payload),
            AppError::NotFound(payload) => (StatusCode::NOT_FOUND, payload),
            AppError::Conflict(payload) => (StatusCode::CONFLICT, payload),
            AppError::TooManyRequests(payload) => (StatusCode::TOO_MANY_REQUESTS, payload),
            AppError::Internal(payload) => (StatusCode::INTERNAL_SERVER_ERROR, payload),
        };

        (status, Json(ApiResponse::<()>::failure(payload))).into_response()
    }
}
