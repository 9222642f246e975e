use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ErrorCode;

/// Structured error carried by the REST envelope and the realtime `error` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ErrorPayload {
    /// Machine-readable error code.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
    /// Extra context such as the action that triggered the error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<serde_json::Value>,
}

/// Success/failure envelope returned by every `/api` route.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    /// Whether the request succeeded.
    pub success: bool,
    /// Payload on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Error on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

impl<T> ApiResponse<T> {
    /// Wrap a successful payload.
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Wrap an error.
    pub fn failure(error: ErrorPayload) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
        }
    }

    /// Convert the envelope into a `Result`, treating a success without data as an error.
    pub fn into_result(self) -> Result<T, ErrorPayload> {
        match (self.success, self.data, self.error) {
            (true, Some(data), _) => Ok(data),
            (_, _, Some(error)) => Err(error),
            _ => Err(ErrorPayload {
                code: ErrorCode::InternalError,
                message: "malformed response envelope".into(),
                details: None,
            }),
        }
    }
}

/// Severity of a user-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    /// An action went through.
    Success,
    /// An action failed.
    Error,
    /// Something needs attention.
    Warning,
    /// Informational update.
    Info,
}

/// Toast-style message pushed to a room or a single connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    /// Suggested display time in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl Notification {
    /// Build a notification stamped with `now`.
    pub fn new(
        kind: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            title: title.into(),
            message: message.into(),
            duration: None,
            timestamp: now,
        }
    }

    /// Attach a display duration.
    pub fn with_duration(mut self, millis: u64) -> Self {
        self.duration = Some(millis);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_envelope_omits_data() {
        let payload = ErrorPayload {
            code: ErrorCode::QueueFull,
            message: "queue is full".into(),
            details: None,
        };
        let json = serde_json::to_value(ApiResponse::<()>::failure(payload)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "success": false,
                "error": { "code": "QUEUE_FULL", "message": "queue is full" }
            })
        );
    }

    #[test]
    fn envelope_round_trips_into_result() {
        let raw = r#"{"success":true,"data":7}"#;
        let envelope: ApiResponse<u32> = serde_json::from_str(raw).unwrap();
        assert_eq!(envelope.into_result(), Ok(7));

        let raw = r#"{"success":false,"error":{"code":"MATCH_NOT_FOUND","message":"gone"}}"#;
        let envelope: ApiResponse<u32> = serde_json::from_str(raw).unwrap();
        assert_eq!(envelope.into_result().unwrap_err().code, ErrorCode::MatchNotFound);
    }

    #[test]
    fn envelope_decodes_payloads_without_a_default() {
        #[derive(Debug, PartialEq, Deserialize)]
        struct Standing {
            wins: u32,
        }

        let raw = r#"{"success":true,"data":{"wins":3}}"#;
        let envelope: ApiResponse<Standing> = serde_json::from_str(raw).unwrap();
        assert_eq!(envelope.into_result(), Ok(Standing { wins: 3 }));

        let raw = r#"{"success":false,"error":{"code":"TEAM_NOT_FOUND","message":"gone"}}"#;
        let envelope: ApiResponse<Standing> = serde_json::from_str(raw).unwrap();
        assert!(envelope.data.is_none());
    }

    #[test]
    fn notification_uses_type_key() {
        let note = Notification::new(
            NotificationType::Success,
            "Joined",
            "You are in position 2",
            OffsetDateTime::UNIX_EPOCH,
        );
        let json = serde_json::to_value(&note).unwrap();
        assert_eq!(json["type"], "success");
        assert_eq!(json["timestamp"], "1970-01-01T00:00:00Z");
        assert!(json.get("duration").is_none());
    }
}
