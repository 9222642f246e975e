use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use time::OffsetDateTime;
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tokio_stream::wrappers::{BroadcastStream, errors::BroadcastStreamRecvError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    config::RateLimitConfig,
    dto::{
        common::{Notification, NotificationType},
        ws::{
            ClientMessage, ConfirmResultRequest, JoinQueueRequest, JoinedQueueEvent,
            LeaveQueueRequest, LeftQueueEvent, PongEvent, Room, RoomEvent, RoomRequest,
            ServerMessage,
        },
    },
    error::ServiceError,
    services::{match_service, queue_service},
    state::{ClientConnection, RoomFrame, SharedState},
};

/// Internal error type for realtime session handling.
///
/// Distinct from `ServiceError`, which is reported back to the client and keeps
/// the connection open.
#[derive(Debug, Error)]
enum SessionError {
    /// Writer channel closed - connection should be terminated immediately.
    #[error("connection closed")]
    ConnectionClosed,
    /// Rejected action, reported to the originating connection.
    #[error("service error: {0}")]
    Service(#[from] ServiceError),
}

/// Handle the full lifecycle of one realtime client connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let connection_id = Uuid::new_v4();
    state.connections().insert(
        connection_id,
        ClientConnection {
            id: connection_id,
            tx: outbound_tx.clone(),
            connected_at: OffsetDateTime::now_utc(),
        },
    );
    info!(%connection_id, "client connected");

    let mut session = Session::new(state.clone(), connection_id, outbound_tx.clone());
    session.subscribe(Room::Public);

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                debug!(%connection_id, payload = %text.as_str(), "received client message");
                if let Err(err) = session.handle_text(text.as_str()).await {
                    info!(%connection_id, error = %err, "terminating session");
                    break;
                }
            }
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                info!(%connection_id, "client closed");
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {
                let err = ServiceError::InvalidInput("binary frames are not supported".into());
                if session.report(&err, None).is_err() {
                    break;
                }
            }
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(%connection_id, error = %err, "websocket error");
                break;
            }
        }
    }

    session.close();
    state.connections().remove(&connection_id);
    info!(%connection_id, "client disconnected");

    finalize(writer_task, outbound_tx).await;
}

/// Per-connection state: joined rooms and action budget.
struct Session {
    state: SharedState,
    id: Uuid,
    tx: mpsc::UnboundedSender<Message>,
    rooms: HashMap<Room, JoinHandle<()>>,
    limiter: RateLimiter,
}

impl Session {
    fn new(state: SharedState, id: Uuid, tx: mpsc::UnboundedSender<Message>) -> Self {
        let limiter = RateLimiter::new(&state.config().rate_limit, Instant::now());
        Self {
            state,
            id,
            tx,
            rooms: HashMap::new(),
            limiter,
        }
    }

    /// Parse, rate-limit and dispatch one inbound text frame.
    async fn handle_text(&mut self, text: &str) -> Result<(), SessionError> {
        let message = match ClientMessage::from_json_str(text) {
            Ok(message) => message,
            Err(err) => {
                warn!(connection_id = %self.id, error = %err, "failed to parse or validate client message");
                return self.report(&err, None);
            }
        };

        let action = message.action();
        if message.is_rate_limited() {
            if let Err(err) = self.limiter.check(Instant::now()) {
                warn!(connection_id = %self.id, action, "rate limit exceeded");
                return self.report(&err, Some(action));
            }
        }

        let outcome = match message {
            ClientMessage::JoinQueue(request) => self.join_queue(request).await,
            ClientMessage::LeaveQueue(request) => self.leave_queue(request).await,
            ClientMessage::ConfirmResult(request) => self.confirm_result(request).await,
            ClientMessage::JoinRoom(request) => self.join_room(request),
            ClientMessage::LeaveRoom(request) => self.leave_room(request),
            ClientMessage::Ping => self.send(&ServerMessage::Pong(PongEvent {
                timestamp: OffsetDateTime::now_utc(),
            })),
        };

        match outcome {
            Err(SessionError::Service(err)) => {
                debug!(connection_id = %self.id, action, error = %err, "action rejected");
                self.report(&err, Some(action))
            }
            other => other,
        }
    }

    async fn join_queue(&mut self, request: JoinQueueRequest) -> Result<(), SessionError> {
        let admission = queue_service::join_queue(&self.state, request).await?;
        self.send(&ServerMessage::JoinedQueue(JoinedQueueEvent {
            team_id: admission.team.id,
            team_name: admission.team.name.clone(),
            position: admission.position,
        }))?;
        self.send(&ServerMessage::Notification(Notification::new(
            NotificationType::Success,
            "Joined the queue",
            format!(
                "{} is number {} in line",
                admission.team.name, admission.position
            ),
            OffsetDateTime::now_utc(),
        )))
    }

    async fn leave_queue(&mut self, request: LeaveQueueRequest) -> Result<(), SessionError> {
        let team = queue_service::leave_queue(&self.state, request.team_id).await?;
        self.send(&ServerMessage::LeftQueue(LeftQueueEvent { team_id: team.id }))
    }

    async fn confirm_result(&mut self, request: ConfirmResultRequest) -> Result<(), SessionError> {
        match_service::confirm_result(&self.state, request).await?;
        Ok(())
    }

    fn join_room(&mut self, request: RoomRequest) -> Result<(), SessionError> {
        if request.room == Room::Admin {
            let config = self.state.config();
            if let Some(expected) = config.admin_token.as_deref() {
                if request.token.as_deref() != Some(expected) {
                    return Err(ServiceError::Unauthorized(
                        "admin room requires a valid token".into(),
                    )
                    .into());
                }
            }
        }

        self.subscribe(request.room);
        self.send(&ServerMessage::RoomJoined(RoomEvent { room: request.room }))
    }

    fn leave_room(&mut self, request: RoomRequest) -> Result<(), SessionError> {
        if let Some(forwarder) = self.rooms.remove(&request.room) {
            forwarder.abort();
            info!(connection_id = %self.id, room = %request.room, "left room");
        }
        self.send(&ServerMessage::RoomLeft(RoomEvent { room: request.room }))
    }

    /// Start forwarding a room's broadcasts to this connection. Joining twice is a no-op.
    fn subscribe(&mut self, room: Room) {
        if self.rooms.contains_key(&room) {
            return;
        }
        let receiver = self.state.rooms().subscribe(room);
        let forwarder = spawn_room_forwarder(receiver, self.tx.clone(), self.id, room);
        self.rooms.insert(room, forwarder);
        info!(connection_id = %self.id, %room, "joined room");
    }

    /// Send a protocol error to this connection only.
    fn report(&self, err: &ServiceError, action: Option<&str>) -> Result<(), SessionError> {
        self.send(&ServerMessage::Error(err.to_payload(action)))
    }

    fn send(&self, message: &ServerMessage) -> Result<(), SessionError> {
        send_message_to_websocket(&self.tx, message)
    }

    fn close(&mut self) {
        for (_, forwarder) in self.rooms.drain() {
            forwarder.abort();
        }
    }
}

/// Pipe a room's broadcast frames into a connection's writer.
fn spawn_room_forwarder(
    receiver: broadcast::Receiver<RoomFrame>,
    tx: mpsc::UnboundedSender<Message>,
    connection_id: Uuid,
    room: Room,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut frames = BroadcastStream::new(receiver);
        while let Some(frame) = frames.next().await {
            match frame {
                Ok(frame) => {
                    if tx.send(Message::Text(frame.text.to_string().into())).is_err() {
                        break;
                    }
                }
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    // Later deltas carry full entity state, so the client recovers on the next one.
                    warn!(%connection_id, %room, skipped, "connection lagged behind room broadcasts");
                }
            }
        }
    })
}

/// Serialize a payload and push it onto the provided WebSocket sender.
///
/// Serialization failures are logged and swallowed; a closed writer is reported
/// so the caller can terminate the session.
fn send_message_to_websocket(
    tx: &mpsc::UnboundedSender<Message>,
    message: &ServerMessage,
) -> Result<(), SessionError> {
    let payload = match serde_json::to_string(message) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(event = message.event_name(), error = %err, "failed to serialize message");
            return Ok(());
        }
    };

    tx.send(Message::Text(payload.into()))
        .map_err(|_| SessionError::ConnectionClosed)
}

/// Fixed-window action budget.
#[derive(Debug)]
struct RateLimiter {
    max_actions: u32,
    window: Duration,
    window_start: Instant,
    used: u32,
}

impl RateLimiter {
    fn new(config: &RateLimitConfig, now: Instant) -> Self {
        Self {
            max_actions: config.max_actions,
            window: config.window,
            window_start: now,
            used: 0,
        }
    }

    fn check(&mut self, now: Instant) -> Result<(), ServiceError> {
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed >= self.window {
            self.window_start = now;
            self.used = 0;
        }

        if self.used >= self.max_actions {
            let remaining = self
                .window
                .saturating_sub(now.saturating_duration_since(self.window_start));
            return Err(ServiceError::RateLimited {
                retry_after_secs: remaining.as_secs().max(1),
            });
        }

        self.used += 1;
        Ok(())
    }
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
