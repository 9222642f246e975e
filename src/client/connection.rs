//! Client side of the realtime channel: one duplex connection, a bounded
//! reconnect loop and a read-only status value.

use std::{
    collections::BTreeMap,
    pin::Pin,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use futures::{Sink, SinkExt, Stream, StreamExt, future::BoxFuture};
use serde::Serialize;
use time::OffsetDateTime;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{Instant, sleep, timeout},
};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::{
    client::ClientError,
    dto::ws::{ClientMessage, Room, RoomRequest},
};

const DEFAULT_RECONNECTION_ATTEMPTS: u32 = 5;
const DEFAULT_RECONNECTION_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_RECONNECTION_DELAY_MAX: Duration = Duration::from_secs(10);
const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_STABLE_CONNECTION: Duration = Duration::from_secs(10);

/// Outgoing half of an established channel.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = ClientError> + Send>>;
/// Incoming half of an established channel; ends when the transport is lost.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, ClientError>> + Send>>;

/// Opens duplex text channels to the server.
pub trait Connector: Send + Sync + 'static {
    /// Open one channel to `url`.
    fn connect(&self, url: &str) -> BoxFuture<'static, Result<(FrameSink, FrameStream), ClientError>>;
}

/// [`Connector`] speaking WebSocket through `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn connect(&self, url: &str) -> BoxFuture<'static, Result<(FrameSink, FrameStream), ClientError>> {
        let url = url.to_owned();
        Box::pin(async move {
            let (socket, _response) = connect_async(url.as_str())
                .await
                .map_err(|err| ClientError::Transport(err.to_string()))?;
            let (sink, stream) = socket.split();

            let sink: FrameSink = Box::pin(
                sink.with(|text: String| async move {
                    Ok::<_, tokio_tungstenite::tungstenite::Error>(Message::Text(text.into()))
                })
                    .sink_map_err(|err: tokio_tungstenite::tungstenite::Error| {
                        ClientError::Transport(err.to_string())
                    }),
            );
            let stream: FrameStream = Box::pin(stream.filter_map(|message| async move {
                match message {
                    Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                    Ok(_) => None,
                    Err(err) => Some(Err(ClientError::Transport(err.to_string()))),
                }
            }));
            Ok((sink, stream))
        })
    }
}

/// Collaborator-supplied connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// HTTP base URL of the server, e.g. `http://localhost:8080`.
    pub server_url: String,
    /// Connect as soon as the client is built.
    pub auto_connect: bool,
    /// Failed attempts tolerated before giving up.
    pub reconnection_attempts: u32,
    /// Delay before the first retry.
    pub reconnection_delay: Duration,
    /// Upper bound of the doubling retry delay.
    pub reconnection_delay_max: Duration,
    /// Bound on a single connect attempt.
    pub connection_timeout: Duration,
    /// Uptime below which a lost channel counts as a failed attempt.
    pub stable_connection: Duration,
}

impl ConnectionConfig {
    /// Settings for `server_url` with the default reconnection policy.
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            auto_connect: true,
            reconnection_attempts: DEFAULT_RECONNECTION_ATTEMPTS,
            reconnection_delay: DEFAULT_RECONNECTION_DELAY,
            reconnection_delay_max: DEFAULT_RECONNECTION_DELAY_MAX,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            stable_connection: DEFAULT_STABLE_CONNECTION,
        }
    }

    pub fn with_auto_connect(mut self, auto_connect: bool) -> Self {
        self.auto_connect = auto_connect;
        self
    }

    pub fn with_reconnection_attempts(mut self, attempts: u32) -> Self {
        self.reconnection_attempts = attempts.max(1);
        self
    }

    pub fn with_reconnection_delay(mut self, initial: Duration, max: Duration) -> Self {
        self.reconnection_delay = initial;
        self.reconnection_delay_max = max.max(initial);
        self
    }

    pub fn with_connection_timeout(mut self, connection_timeout: Duration) -> Self {
        self.connection_timeout = connection_timeout;
        self
    }

    pub fn with_stable_connection(mut self, stable_connection: Duration) -> Self {
        self.stable_connection = stable_connection;
        self
    }

    /// WebSocket endpoint derived from the HTTP base URL.
    pub fn ws_url(&self) -> String {
        let base = self.server_url.trim_end_matches('/');
        let base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_owned()
        };
        format!("{base}/ws")
    }
}

/// Lifecycle phase of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionPhase {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// Retry budget exhausted; waits for [`ConnectionManager::retry`].
    Failed,
}

/// Read-only connection status, owned by the [`ConnectionManager`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub phase: ConnectionPhase,
    pub connected: bool,
    pub last_error: Option<String>,
    pub reconnect_attempts: u32,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_connected_at: Option<OffsetDateTime>,
    /// Incremented on every entry into `connected`.
    pub epoch: u64,
}

/// Owns the duplex channel and its reconnection policy.
pub struct ConnectionManager {
    config: ConnectionConfig,
    connector: Arc<dyn Connector>,
    status: watch::Sender<ConnectionStatus>,
    inbound: mpsc::UnboundedSender<String>,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    rooms: Mutex<BTreeMap<Room, Option<String>>>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    /// Build a manager; inbound text frames are delivered on the returned receiver.
    pub fn new(
        config: ConnectionConfig,
        connector: Arc<dyn Connector>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
        let (inbound, frames) = mpsc::unbounded_channel();
        let (status, _) = watch::channel(ConnectionStatus::default());
        let manager = Arc::new(Self {
            config,
            connector,
            status,
            inbound,
            outbound: Mutex::new(None),
            rooms: Mutex::new(BTreeMap::new()),
            supervisor: Mutex::new(None),
        });
        (manager, frames)
    }

    /// Snapshot of the current status.
    pub fn status(&self) -> ConnectionStatus {
        self.status.borrow().clone()
    }

    /// Change feed of the status.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// Start connecting unless a connection loop is already running.
    pub fn connect(self: &Arc<Self>) {
        let mut supervisor = self.supervisor.lock().unwrap_or_else(PoisonError::into_inner);
        let phase = self.status.borrow().phase;
        if matches!(
            phase,
            ConnectionPhase::Connecting | ConnectionPhase::Connected | ConnectionPhase::Reconnecting
        ) {
            debug!(?phase, "connection loop already running");
            return;
        }
        if let Some(previous) = supervisor.take() {
            previous.abort();
        }

        self.status.send_modify(|status| {
            status.phase = ConnectionPhase::Connecting;
            status.connected = false;
        });
        *supervisor = Some(tokio::spawn(self.clone().run()));
    }

    /// Close the channel and cancel the reconnect loop.
    pub fn disconnect(&self) {
        if let Some(task) = self
            .supervisor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
        self.set_outbound(None);
        self.status.send_modify(|status| {
            if status.phase != ConnectionPhase::Disconnected {
                info!("disconnected from court server");
            }
            status.phase = ConnectionPhase::Disconnected;
            status.connected = false;
        });
    }

    /// Reset the attempt counter and reconnect after the budget was exhausted.
    pub fn retry(self: &Arc<Self>) {
        if self.status.borrow().phase != ConnectionPhase::Failed {
            return;
        }
        self.status.send_modify(|status| {
            status.reconnect_attempts = 0;
            status.last_error = None;
        });
        self.connect();
    }

    /// Send one message. Fails fast when not connected; never queues.
    pub fn send(&self, message: &ClientMessage) -> Result<(), ClientError> {
        let guard = self.outbound.lock().unwrap_or_else(PoisonError::into_inner);
        let outbound = guard
            .as_ref()
            .filter(|_| self.status.borrow().connected)
            .ok_or(ClientError::NotConnected)?;

        let frame = serde_json::to_string(message)
            .map_err(|err| ClientError::Decode(err.to_string()))?;
        outbound.send(frame).map_err(|_| ClientError::NotConnected)
    }

    /// Join a room now (when connected) and after every reconnect.
    pub fn join_room(&self, room: Room, token: Option<String>) -> Result<(), ClientError> {
        self.rooms
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(room, token.clone());
        self.send_if_connected(&ClientMessage::JoinRoom(RoomRequest { room, token }))
    }

    /// Leave a room and stop re-joining it.
    pub fn leave_room(&self, room: Room) -> Result<(), ClientError> {
        self.rooms
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&room);
        self.send_if_connected(&ClientMessage::LeaveRoom(RoomRequest { room, token: None }))
    }

    fn send_if_connected(&self, message: &ClientMessage) -> Result<(), ClientError> {
        match self.send(message) {
            Err(ClientError::NotConnected) => Ok(()),
            other => other,
        }
    }

    fn set_outbound(&self, outbound: Option<mpsc::UnboundedSender<String>>) {
        *self.outbound.lock().unwrap_or_else(PoisonError::into_inner) = outbound;
    }

    /// Connect, pump, and reconnect with capped exponential backoff until the budget runs out.
    ///
    /// A channel lost after `stable_connection` is retried at once with a fresh budget;
    /// one lost sooner counts as a failed attempt.
    async fn run(self: Arc<Self>) {
        let mut delay = self.config.reconnection_delay;
        let mut attempts = self.status.borrow().reconnect_attempts;
        let url = self.config.ws_url();

        loop {
            let attempt = timeout(self.config.connection_timeout, self.connector.connect(&url))
                .await
                .unwrap_or(Err(ClientError::Timeout(self.config.connection_timeout)));

            let failure = match attempt {
                Ok((sink, stream)) => {
                    let established = Instant::now();
                    let lost = self.pump(sink, stream).await;
                    warn!(error = %lost, "connection to court server lost");
                    if established.elapsed() < self.config.stable_connection {
                        lost
                    } else {
                        attempts = 0;
                        delay = self.config.reconnection_delay;
                        self.status.send_modify(|status| {
                            status.phase = ConnectionPhase::Reconnecting;
                            status.connected = false;
                            status.last_error = Some(lost.to_string());
                        });
                        continue;
                    }
                }
                Err(err) => err,
            };

            attempts += 1;
            let exhausted = attempts >= self.config.reconnection_attempts;
            warn!(attempts, error = %failure, "connection attempt failed");
            self.status.send_modify(|status| {
                status.reconnect_attempts = attempts;
                status.last_error = Some(failure.to_string());
                status.connected = false;
                status.phase = if exhausted {
                    ConnectionPhase::Failed
                } else {
                    ConnectionPhase::Reconnecting
                };
            });
            if exhausted {
                warn!(attempts, "reconnect budget exhausted");
                return;
            }

            sleep(delay).await;
            delay = (delay * 2).min(self.config.reconnection_delay_max);
        }
    }

    /// Drive an established channel until it breaks, returning why.
    async fn pump(&self, mut sink: FrameSink, mut stream: FrameStream) -> ClientError {
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        self.set_outbound(Some(outbound_tx));
        self.status.send_modify(|status| {
            status.phase = ConnectionPhase::Connected;
            status.connected = true;
            status.reconnect_attempts = 0;
            status.last_error = None;
            status.last_connected_at = Some(OffsetDateTime::now_utc());
            status.epoch += 1;
        });
        info!(url = %self.config.ws_url(), "connected to court server");

        for message in self.room_requests() {
            if let Err(err) = self.send(&message) {
                warn!(error = %err, "failed to queue room subscription");
            }
        }

        let reason = loop {
            tokio::select! {
                frame = stream.next() => match frame {
                    Some(Ok(text)) => {
                        if self.inbound.send(text).is_err() {
                            debug!("event router gone; dropping frame");
                        }
                    }
                    Some(Err(err)) => break err,
                    None => break ClientError::Transport("connection closed by server".into()),
                },
                Some(frame) = outbound_rx.recv() => {
                    if let Err(err) = sink.send(frame).await {
                        break err;
                    }
                }
            }
        };

        self.set_outbound(None);
        reason
    }

    /// Baseline `public` subscription followed by every extra room joined by the caller.
    fn room_requests(&self) -> Vec<ClientMessage> {
        let rooms = self.rooms.lock().unwrap_or_else(PoisonError::into_inner);
        std::iter::once(ClientMessage::JoinRoom(RoomRequest {
            room: Room::Public,
            token: None,
        }))
        .chain(
            rooms
                .iter()
                .filter(|(room, _)| **room != Room::Public)
                .map(|(room, token)| {
                    ClientMessage::JoinRoom(RoomRequest {
                        room: *room,
                        token: token.clone(),
                    })
                }),
        )
        .collect()
    }
}
