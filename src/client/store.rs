//! Single-writer mirrors of authority state with snapshot catch-up.

use std::{sync::Arc, time::Duration};

use futures::future::{BoxFuture, OptionFuture};
use serde::de::DeserializeOwned;
use tokio::{sync::watch, task::JoinHandle, time::timeout};
use tracing::{debug, warn};

use crate::{
    client::{
        ClientError,
        connection::ConnectionStatus,
        router::{EventRouter, Subscription, TypedSubscription},
        snapshot::SnapshotSource,
    },
    dto::{common::ErrorPayload, ws::EVENT_ERROR},
    error::ErrorScope,
};

const DEFAULT_SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(5);

/// Local replica of one entity kind.
pub trait Mirror: Clone + Default + Send + Sync + 'static {
    /// Payload of the snapshot query.
    type Snapshot: Send + 'static;
    /// Payload of the delta event.
    type Delta: DeserializeOwned + Send + 'static;

    /// Event carrying deltas for this mirror.
    const EVENT: &'static str;
    /// Errors this mirror surfaces in its `error` field.
    const SCOPE: ErrorScope;

    /// Fetch the authority's current state.
    fn fetch(source: &dyn SnapshotSource) -> BoxFuture<'static, Result<Self::Snapshot, ClientError>>;
    /// Replace the held value wholesale.
    fn replace(&mut self, snapshot: Self::Snapshot);
    /// Apply one delta; returns whether the value changed.
    fn apply(&mut self, delta: Self::Delta) -> bool;
    /// Revision of the held value.
    fn revision(&self) -> u64;
}

/// Mirror value together with its synchronization state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Synced<M> {
    /// Last known value.
    pub value: M,
    /// A catch-up snapshot is in flight.
    pub syncing: bool,
    /// Last error relevant to this mirror.
    pub error: Option<ErrorPayload>,
}

/// Store owning one writer task; readers only observe.
pub struct SyncedStore<M: Mirror> {
    state: watch::Receiver<Synced<M>>,
    writer: JoinHandle<()>,
}

impl<M: Mirror> SyncedStore<M> {
    /// Subscribe to the router and connection status, then start the writer.
    pub fn new(
        router: &EventRouter,
        status: watch::Receiver<ConnectionStatus>,
        source: Arc<dyn SnapshotSource>,
    ) -> Self {
        Self::with_fetch_timeout(router, status, source, DEFAULT_SNAPSHOT_TIMEOUT)
    }

    /// Same as [`SyncedStore::new`]; a catch-up snapshot taking longer than
    /// `fetch_timeout` fails with [`ClientError::Timeout`].
    pub fn with_fetch_timeout(
        router: &EventRouter,
        status: watch::Receiver<ConnectionStatus>,
        source: Arc<dyn SnapshotSource>,
        fetch_timeout: Duration,
    ) -> Self {
        let deltas = router.subscribe(M::EVENT);
        let errors = router.subscribe_typed::<ErrorPayload>(EVENT_ERROR);
        let (tx, state) = watch::channel(Synced::default());
        let writer = tokio::spawn(run_writer(tx, deltas, errors, status, source, fetch_timeout));
        Self { state, writer }
    }

    /// Current value and sync state.
    pub fn get(&self) -> Synced<M> {
        self.state.borrow().clone()
    }

    /// Current value only.
    pub fn value(&self) -> M {
        self.state.borrow().value.clone()
    }

    /// Change feed.
    pub fn subscribe(&self) -> watch::Receiver<Synced<M>> {
        self.state.clone()
    }

    /// Wait until the store satisfies `predicate`.
    pub async fn wait_for(&self, predicate: impl FnMut(&Synced<M>) -> bool) -> Option<Synced<M>> {
        let mut state = self.state.clone();
        let synced = state.wait_for(predicate).await.ok()?.clone();
        Some(synced)
    }
}

impl<M: Mirror> Drop for SyncedStore<M> {
    fn drop(&mut self) {
        self.writer.abort();
    }
}

/// The only code path mutating a store.
///
/// On every new connection epoch a snapshot is fetched; deltas arriving meanwhile
/// are held back and replayed through the revision gate once the snapshot landed,
/// so anything older than the snapshot is discarded. A fetch that times out ends
/// the catch-up like any other failure.
async fn run_writer<M: Mirror>(
    tx: watch::Sender<Synced<M>>,
    mut deltas: Subscription,
    mut errors: TypedSubscription<ErrorPayload>,
    mut status: watch::Receiver<ConnectionStatus>,
    source: Arc<dyn SnapshotSource>,
    fetch_timeout: Duration,
) {
    let mut synced_epoch = 0;
    let mut fetching = false;
    let mut pending: OptionFuture<BoxFuture<'static, Result<M::Snapshot, ClientError>>> =
        None.into();
    let mut held_back: Vec<M::Delta> = Vec::new();

    // The connection may already be up when the store is built.
    status.mark_changed();

    loop {
        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let (connected, epoch) = {
                    let status = status.borrow_and_update();
                    (status.connected, status.epoch)
                };
                if connected && epoch != synced_epoch {
                    debug!(event = M::EVENT, epoch, "catching up from snapshot");
                    synced_epoch = epoch;
                    held_back.clear();
                    let fetch = M::fetch(source.as_ref());
                    pending = Some(Box::pin(async move {
                        timeout(fetch_timeout, fetch)
                            .await
                            .unwrap_or(Err(ClientError::Timeout(fetch_timeout)))
                    }) as BoxFuture<'static, _>)
                    .into();
                    fetching = true;
                    tx.send_modify(|synced| synced.syncing = true);
                }
            }
            Some(result) = &mut pending, if fetching => {
                fetching = false;
                pending = None.into();
                let replay = std::mem::take(&mut held_back);
                tx.send_modify(|synced| {
                    match result {
                        Ok(snapshot) => {
                            synced.value.replace(snapshot);
                            synced.error = None;
                        }
                        Err(err) => {
                            warn!(event = M::EVENT, error = %err, "snapshot fetch failed; keeping previous value");
                            synced.error = Some(err.to_payload());
                        }
                    }
                    for delta in replay {
                        synced.value.apply(delta);
                    }
                    synced.syncing = false;
                });
                debug!(event = M::EVENT, revision = tx.borrow().value.revision(), "catch-up finished");
            }
            delta = deltas.receiver.recv() => {
                let Some(delta) = delta else {
                    break;
                };
                match serde_json::from_value::<M::Delta>(delta) {
                    Ok(delta) if fetching => held_back.push(delta),
                    Ok(delta) => {
                        tx.send_if_modified(|synced| {
                            let applied = synced.value.apply(delta);
                            if applied {
                                synced.error = None;
                            }
                            applied
                        });
                    }
                    Err(err) => warn!(event = M::EVENT, error = %err, "dropping undecodable delta"),
                }
            }
            Some(error) = errors.recv() => {
                if error.code.scope() == M::SCOPE {
                    tx.send_modify(|synced| synced.error = Some(error));
                }
            }
        }
    }
    debug!(event = M::EVENT, "store writer stopped");
}
