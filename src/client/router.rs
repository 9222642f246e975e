//! Named-event multiplexer over the single realtime channel.

use std::{
    marker::PhantomData,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use dashmap::DashMap;
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, warn};

/// Opaque handle identifying one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Receiving end of a subscription; yields the `data` of each matching event.
#[derive(Debug)]
pub struct Subscription {
    /// Token to pass to [`EventRouter::unsubscribe`].
    pub id: SubscriptionId,
    /// Event payloads in arrival order.
    pub receiver: mpsc::UnboundedReceiver<Value>,
}

/// Subscription decoding payloads into `T`; undecodable payloads are skipped.
#[derive(Debug)]
pub struct TypedSubscription<T> {
    inner: Subscription,
    _payload: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> TypedSubscription<T> {
    /// Subscription token.
    pub fn id(&self) -> SubscriptionId {
        self.inner.id
    }

    /// Next decodable payload, or `None` once the router is gone.
    pub async fn recv(&mut self) -> Option<T> {
        while let Some(value) = self.inner.receiver.recv().await {
            match serde_json::from_value(value) {
                Ok(payload) => return Some(payload),
                Err(err) => warn!(error = %err, "dropping undecodable event payload"),
            }
        }
        None
    }
}

struct Subscriber {
    id: SubscriptionId,
    tx: mpsc::UnboundedSender<Value>,
}

#[derive(Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Value,
}

/// Stable subscriber lists keyed by event name.
#[derive(Default)]
pub struct EventRouter {
    subscribers: DashMap<String, Vec<Subscriber>>,
    next_id: AtomicU64,
}

impl EventRouter {
    /// Create an empty router.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register interest in `event`.
    pub fn subscribe(&self, event: &str) -> Subscription {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, receiver) = mpsc::unbounded_channel();
        self.subscribers
            .entry(event.to_owned())
            .or_default()
            .push(Subscriber { id, tx });
        Subscription { id, receiver }
    }

    /// Register interest in `event`, decoding payloads into `T`.
    pub fn subscribe_typed<T: DeserializeOwned>(&self, event: &str) -> TypedSubscription<T> {
        TypedSubscription {
            inner: self.subscribe(event),
            _payload: PhantomData,
        }
    }

    /// Drop a subscription. Returns whether it existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut removed = false;
        for mut entry in self.subscribers.iter_mut() {
            let before = entry.len();
            entry.retain(|subscriber| subscriber.id != id);
            removed |= entry.len() != before;
        }
        self.subscribers.retain(|_, subscribers| !subscribers.is_empty());
        removed
    }

    /// Live subscribers for `event`.
    pub fn subscriber_count(&self, event: &str) -> usize {
        self.subscribers
            .get(event)
            .map_or(0, |subscribers| subscribers.len())
    }

    /// Parse one `{ event, data }` frame and fan it out. Returns the number of deliveries.
    pub fn dispatch(&self, frame: &str) -> usize {
        let envelope = match serde_json::from_str::<Envelope>(frame) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(error = %err, "dropping malformed frame");
                return 0;
            }
        };

        let Some(mut subscribers) = self.subscribers.get_mut(&envelope.event) else {
            debug!(event = %envelope.event, "no subscriber for event");
            return 0;
        };

        // Closed receivers are pruned on the way.
        subscribers.retain(|subscriber| subscriber.tx.send(envelope.data.clone()).is_ok());
        subscribers.len()
    }

    /// Pump inbound frames into subscribers until the frame channel closes.
    pub fn spawn(self: Arc<Self>, mut frames: mpsc::UnboundedReceiver<String>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(frame) = frames.recv().await {
                self.dispatch(&frame);
            }
            debug!("event router stopped");
        })
    }
}
