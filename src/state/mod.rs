pub mod authority;
pub mod court;
pub mod match_machine;
pub mod queue;
mod rooms;
pub mod team;

use std::{sync::Arc, time::Instant};

use axum::extract::ws::Message;
use dashmap::DashMap;
use time::OffsetDateTime;
use tokio::sync::{Mutex, mpsc};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    error::ServiceError,
    services::broadcast_events,
};

pub use self::rooms::{RoomFrame, RoomHub};
use self::authority::{Authority, Delta};

pub type SharedState = Arc<AppState>;

#[derive(Clone)]
/// Handle used to push messages to a connected realtime client.
pub struct ClientConnection {
    pub id: Uuid,
    pub tx: mpsc::UnboundedSender<Message>,
    pub connected_at: OffsetDateTime,
}

/// Central application state: configuration, the authority and live connections.
pub struct AppState {
    config: Arc<AppConfig>,
    authority: Mutex<Authority>,
    rooms: RoomHub,
    connections: DashMap<Uuid, ClientConnection>,
    started_at: Instant,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    pub fn new(config: AppConfig) -> SharedState {
        Arc::new(Self {
            authority: Mutex::new(Authority::new(config.authority_settings())),
            rooms: RoomHub::new(config.room_capacity),
            connections: DashMap::new(),
            started_at: Instant::now(),
            config: Arc::new(config),
        })
    }

    /// Runtime configuration.
    pub fn config(&self) -> Arc<AppConfig> {
        self.config.clone()
    }

    /// Broadcast hubs for the realtime rooms.
    pub fn rooms(&self) -> &RoomHub {
        &self.rooms
    }

    /// Registry of open realtime sockets keyed by connection identifier.
    pub fn connections(&self) -> &DashMap<Uuid, ClientConnection> {
        &self.connections
    }

    /// Seconds since the state was built.
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Run one authority action to completion and fan out its deltas.
    ///
    /// Deltas are published before the authority lock is released so observers
    /// receive them in emission order.
    pub async fn run_action<F, T>(&self, action: F) -> Result<T, ServiceError>
    where
        F: FnOnce(&mut Authority, OffsetDateTime) -> Result<(T, Vec<Delta>), ServiceError>,
    {
        let mut authority = self.authority.lock().await;
        let now = OffsetDateTime::now_utc();
        let (value, deltas) = action(&mut authority, now)?;
        broadcast_events::publish_deltas(self, deltas, now);
        drop(authority);
        Ok(value)
    }

    /// Read from the authority without mutating it.
    pub async fn read<F, T>(&self, query: F) -> T
    where
        F: FnOnce(&Authority, OffsetDateTime) -> T,
    {
        let authority = self.authority.lock().await;
        query(&authority, OffsetDateTime::now_utc())
    }
}
