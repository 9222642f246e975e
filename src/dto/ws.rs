use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::{
        common::{ErrorPayload, Notification},
        court::CourtStatusPayload,
        matches::MatchUpdatedEvent,
        queue::QueueUpdatedEvent,
        validation::validate_team_name,
    },
    error::ServiceError,
    state::match_machine::FinalScore,
};

/// Realtime event carrying the full queue after a change.
pub const EVENT_QUEUE_UPDATED: &str = "queue-updated";
/// Realtime event carrying the full match after a transition.
pub const EVENT_MATCH_UPDATED: &str = "match-updated";
/// Realtime event carrying the court status.
pub const EVENT_COURT_STATUS: &str = "court-status";
/// Realtime toast-style notification.
pub const EVENT_NOTIFICATION: &str = "notification";
/// Realtime protocol error addressed to one connection.
pub const EVENT_ERROR: &str = "error";
/// Acknowledgement of a successful `join-queue`.
pub const EVENT_JOINED_QUEUE: &str = "joined-queue";

/// Broadcast scopes a connection can join.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Room {
    /// Everyone, joined automatically.
    Public,
    /// Privileged broadcasts.
    Admin,
}

impl Room {
    /// Wire name of the room.
    pub fn as_str(self) -> &'static str {
        match self {
            Room::Public => "public",
            Room::Admin => "admin",
        }
    }
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Queue admission request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct JoinQueueRequest {
    #[validate(custom(function = "validate_team_name"))]
    pub team_name: String,
    #[validate(range(min = 1, max = 12))]
    pub members: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 120))]
    pub contact_info: Option<String>,
}

/// Withdrawal request for a team admitted earlier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LeaveQueueRequest {
    pub team_id: Uuid,
}

/// A team's acknowledgement (or rejection) of a match result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmResultRequest {
    pub match_id: Uuid,
    pub team_id: Uuid,
    pub confirmed: bool,
    /// Score the team believes is final; a mismatch disputes the result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_score: Option<FinalScore>,
}

/// Room membership change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RoomRequest {
    pub room: Room,
    /// Admin token, required for the admin room when one is configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// Messages accepted from realtime clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientMessage {
    JoinQueue(JoinQueueRequest),
    LeaveQueue(LeaveQueueRequest),
    ConfirmResult(ConfirmResultRequest),
    JoinRoom(RoomRequest),
    LeaveRoom(RoomRequest),
    Ping,
}

impl ClientMessage {
    /// Parse and validate an inbound text frame.
    pub fn from_json_str(raw: &str) -> Result<Self, ServiceError> {
        let message: Self = serde_json::from_str(raw)
            .map_err(|err| ServiceError::InvalidInput(format!("malformed message: {err}")))?;
        if let ClientMessage::JoinQueue(request) = &message {
            request.validate()?;
        }
        Ok(message)
    }

    /// Wire event name, echoed back in error details.
    pub fn action(&self) -> &'static str {
        match self {
            ClientMessage::JoinQueue(_) => "join-queue",
            ClientMessage::LeaveQueue(_) => "leave-queue",
            ClientMessage::ConfirmResult(_) => "confirm-result",
            ClientMessage::JoinRoom(_) => "join-room",
            ClientMessage::LeaveRoom(_) => "leave-room",
            ClientMessage::Ping => "ping",
        }
    }

    /// Whether the message counts against the per-connection action budget.
    pub fn is_rate_limited(&self) -> bool {
        !matches!(self, ClientMessage::Ping)
    }
}

/// Acknowledgement sent to the connection that admitted a team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JoinedQueueEvent {
    pub team_id: Uuid,
    pub team_name: String,
    pub position: usize,
}

/// Acknowledgement of a withdrawal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LeftQueueEvent {
    pub team_id: Uuid,
}

/// Acknowledgement of a room membership change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RoomEvent {
    pub room: Room,
}

/// Reply to `ping`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PongEvent {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Messages pushed to realtime clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerMessage {
    QueueUpdated(QueueUpdatedEvent),
    MatchUpdated(MatchUpdatedEvent),
    CourtStatus(CourtStatusPayload),
    Notification(Notification),
    Error(ErrorPayload),
    JoinedQueue(JoinedQueueEvent),
    LeftQueue(LeftQueueEvent),
    RoomJoined(RoomEvent),
    RoomLeft(RoomEvent),
    Pong(PongEvent),
}

impl ServerMessage {
    /// Wire event name.
    pub fn event_name(&self) -> &'static str {
        match self {
            ServerMessage::QueueUpdated(_) => EVENT_QUEUE_UPDATED,
            ServerMessage::MatchUpdated(_) => EVENT_MATCH_UPDATED,
            ServerMessage::CourtStatus(_) => EVENT_COURT_STATUS,
            ServerMessage::Notification(_) => EVENT_NOTIFICATION,
            ServerMessage::Error(_) => EVENT_ERROR,
            ServerMessage::JoinedQueue(_) => EVENT_JOINED_QUEUE,
            ServerMessage::LeftQueue(_) => "left-queue",
            ServerMessage::RoomJoined(_) => "room-joined",
            ServerMessage::RoomLeft(_) => "room-left",
            ServerMessage::Pong(_) => "pong",
        }
    }
}
