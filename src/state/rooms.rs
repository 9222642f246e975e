use std::sync::Arc;

use tokio::sync::broadcast;

use crate::dto::ws::Room;

/// Pre-serialized frame fanned out to every member of a room.
#[derive(Clone, Debug)]
pub struct RoomFrame {
    /// Wire event name, kept for logging.
    pub event: &'static str,
    /// Full `{ event, data }` JSON text.
    pub text: Arc<str>,
}

/// Broadcast hubs for the `public` and `admin` rooms.
pub struct RoomHub {
    public: broadcast::Sender<RoomFrame>,
    admin: broadcast::Sender<RoomFrame>,
}

impl RoomHub {
    /// Build both rooms with the given per-room channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (public, _receiver) = broadcast::channel(capacity);
        let (admin, _receiver) = broadcast::channel(capacity);
        Self { public, admin }
    }

    /// Register a new member that will receive subsequent frames.
    pub fn subscribe(&self, room: Room) -> broadcast::Receiver<RoomFrame> {
        self.sender(room).subscribe()
    }

    /// Send a frame to all current members, ignoring delivery errors.
    pub fn broadcast(&self, room: Room, frame: RoomFrame) {
        let _ = self.sender(room).send(frame);
    }

    /// Number of members currently subscribed to `room`.
    pub fn member_count(&self, room: Room) -> usize {
        self.sender(room).receiver_count()
    }

    fn sender(&self, room: Room) -> &broadcast::Sender<RoomFrame> {
        match room {
            Room::Public => &self.public,
            Room::Admin => &self.admin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rooms_are_isolated() {
        let hub = RoomHub::new(8);
        let mut public = hub.subscribe(Room::Public);
        let mut admin = hub.subscribe(Room::Admin);

        hub.broadcast(
            Room::Admin,
            RoomFrame {
                event: "notification",
                text: Arc::from("{}"),
            },
        );

        assert_eq!(admin.recv().await.unwrap().event, "notification");
        assert!(public.try_recv().is_err());
        assert_eq!(hub.member_count(Room::Public), 1);
    }
}
