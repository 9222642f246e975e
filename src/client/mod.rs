//! Client library keeping a local mirror of the court in sync with the server.
//!
//! A [`CourtClient`] owns one [`ConnectionManager`], one [`EventRouter`] pumping
//! its inbound frames, and three synchronized stores (queue, current match,
//! court). Each store applies deltas through its own writer task and resyncs
//! from the snapshot surface every time the connection (re)enters `connected`.

pub mod connection;
pub mod court_tracker;
pub mod match_store;
pub mod queue_store;
pub mod router;
pub mod snapshot;
pub mod store;

use std::{sync::Arc, time::Duration};

use thiserror::Error;
use tokio::{sync::watch, task::JoinHandle};
use uuid::Uuid;

use crate::{
    dto::{
        common::{ErrorPayload, Notification},
        ws::{
            ClientMessage, ConfirmResultRequest, EVENT_ERROR, EVENT_NOTIFICATION,
            JoinQueueRequest, LeaveQueueRequest, Room,
        },
    },
    error::ErrorCode,
};

pub use self::{
    connection::{
        ConnectionConfig, ConnectionManager, ConnectionPhase, ConnectionStatus, Connector,
        WsConnector,
    },
    court_tracker::{CourtMirror, CourtTracker},
    match_store::{MatchMirror, MatchStore},
    queue_store::{QueueMirror, QueueStore},
    router::{EventRouter, Subscription, SubscriptionId, TypedSubscription},
    snapshot::{HttpSnapshotSource, SnapshotSource},
    store::{Mirror, Synced, SyncedStore},
};

/// Failures surfaced by the client library.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ClientError {
    /// An action was attempted while the channel is down.
    #[error("not connected to the court server")]
    NotConnected,
    /// Transport-level failure while connecting or exchanging frames.
    #[error("transport error: {0}")]
    Transport(String),
    /// Connect attempt or snapshot request exceeded the configured timeout.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    /// Snapshot request could not be completed.
    #[error("snapshot request to `{path}` failed: {message}")]
    Snapshot {
        /// Requested path.
        path: String,
        /// Underlying failure.
        message: String,
    },
    /// A payload did not match the expected shape.
    #[error("failed to decode payload: {0}")]
    Decode(String),
    /// The server answered with a structured error.
    #[error("rejected by server: {}", .0.message)]
    Rejected(ErrorPayload),
}

impl ClientError {
    /// Structured form stored in a store's `error` field.
    pub fn to_payload(&self) -> ErrorPayload {
        match self {
            ClientError::Rejected(payload) => payload.clone(),
            ClientError::Decode(_) => ErrorPayload {
                code: ErrorCode::InternalError,
                message: self.to_string(),
                details: None,
            },
            ClientError::NotConnected
            | ClientError::Transport(_)
            | ClientError::Timeout(_)
            | ClientError::Snapshot { .. } => ErrorPayload {
                code: ErrorCode::NetworkError,
                message: self.to_string(),
                details: None,
            },
        }
    }
}

/// Facade wiring the connection, router and stores together.
pub struct CourtClient {
    connection: Arc<ConnectionManager>,
    router: Arc<EventRouter>,
    router_task: JoinHandle<()>,
    queue: QueueStore,
    current_match: MatchStore,
    court: CourtTracker,
}

impl CourtClient {
    /// Build a client talking WebSocket and HTTP to `config.server_url`.
    pub fn start(config: ConnectionConfig) -> Result<Self, ClientError> {
        let source = HttpSnapshotSource::new(&config.server_url, config.connection_timeout)?;
        Ok(Self::with_parts(config, Arc::new(WsConnector), Arc::new(source)))
    }

    /// Build a client from explicit transport and snapshot implementations.
    pub fn with_parts(
        config: ConnectionConfig,
        connector: Arc<dyn Connector>,
        source: Arc<dyn SnapshotSource>,
    ) -> Self {
        let auto_connect = config.auto_connect;
        let fetch_timeout = config.connection_timeout;
        let (connection, frames) = ConnectionManager::new(config, connector);
        let router = EventRouter::new();
        let router_task = router.clone().spawn(frames);

        // Stores subscribe before the first connect so no transition is missed.
        let queue = SyncedStore::with_fetch_timeout(
            &router,
            connection.watch_status(),
            source.clone(),
            fetch_timeout,
        );
        let current_match = SyncedStore::with_fetch_timeout(
            &router,
            connection.watch_status(),
            source.clone(),
            fetch_timeout,
        );
        let court =
            SyncedStore::with_fetch_timeout(&router, connection.watch_status(), source, fetch_timeout);

        let client = Self {
            connection,
            router,
            router_task,
            queue,
            current_match,
            court,
        };
        if auto_connect {
            client.connect();
        }
        client
    }

    /// Open the channel; reconnects automatically within the configured budget.
    pub fn connect(&self) {
        self.connection.connect();
    }

    /// Close the channel and cancel any pending reconnect.
    pub fn disconnect(&self) {
        self.connection.disconnect();
    }

    /// Start over after the reconnect budget was exhausted.
    pub fn retry(&self) {
        self.connection.retry();
    }

    /// Current connection status.
    pub fn status(&self) -> ConnectionStatus {
        self.connection.status()
    }

    /// Connection status change feed.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.connection.watch_status()
    }

    /// Ask the server to admit a team. The outcome arrives as `joined-queue` or `error`.
    pub fn join_queue(&self, request: JoinQueueRequest) -> Result<(), ClientError> {
        self.connection.send(&ClientMessage::JoinQueue(request))
    }

    /// Withdraw a team admitted earlier.
    pub fn leave_queue(&self, team_id: Uuid) -> Result<(), ClientError> {
        self.connection
            .send(&ClientMessage::LeaveQueue(LeaveQueueRequest { team_id }))
    }

    /// Confirm or reject the result of a match.
    pub fn confirm_result(&self, request: ConfirmResultRequest) -> Result<(), ClientError> {
        self.connection.send(&ClientMessage::ConfirmResult(request))
    }

    /// Join a room now and after every reconnect.
    pub fn join_room(&self, room: Room, token: Option<String>) -> Result<(), ClientError> {
        self.connection.join_room(room, token)
    }

    /// Leave a room joined earlier.
    pub fn leave_room(&self, room: Room) -> Result<(), ClientError> {
        self.connection.leave_room(room)
    }

    /// Queue mirror.
    pub fn queue(&self) -> &QueueStore {
        &self.queue
    }

    /// Current match mirror.
    pub fn current_match(&self) -> &MatchStore {
        &self.current_match
    }

    /// Court status mirror.
    pub fn court(&self) -> &CourtTracker {
        &self.court
    }

    /// Server notifications addressed to this client's rooms.
    pub fn notifications(&self) -> TypedSubscription<Notification> {
        self.router.subscribe_typed(EVENT_NOTIFICATION)
    }

    /// Every protocol error sent to this connection, whatever its scope.
    pub fn errors(&self) -> TypedSubscription<ErrorPayload> {
        self.router.subscribe_typed(EVENT_ERROR)
    }

    /// Raw access to the event router for events without a dedicated helper.
    pub fn router(&self) -> &Arc<EventRouter> {
        &self.router
    }
}

impl Drop for CourtClient {
    fn drop(&mut self) {
        self.connection.disconnect();
        self.router_task.abort();
    }
}
