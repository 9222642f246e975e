//! Pull side of the catch-up protocol.

use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use reqwest::Client;
use serde::de::DeserializeOwned;

use crate::{
    client::ClientError,
    dto::{
        common::ApiResponse, court::CourtStatusPayload, matches::CurrentMatchResponse,
        queue::QueueSnapshot,
    },
};

/// Query surface returning the authority's current state, one entity kind per call.
pub trait SnapshotSource: Send + Sync + 'static {
    /// Current queue contents.
    fn fetch_queue(&self) -> BoxFuture<'static, Result<QueueSnapshot, ClientError>>;
    /// Match on (or last on) the court.
    fn fetch_current_match(&self) -> BoxFuture<'static, Result<CurrentMatchResponse, ClientError>>;
    /// Court status.
    fn fetch_court_status(&self) -> BoxFuture<'static, Result<CourtStatusPayload, ClientError>>;
}

/// [`SnapshotSource`] backed by the server's `/api` routes.
#[derive(Clone)]
pub struct HttpSnapshotSource {
    client: Client,
    base_url: Arc<str>,
}

impl HttpSnapshotSource {
    /// Build a source for the server at `base_url` (e.g. `http://localhost:8080`);
    /// each request is bounded by `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ClientError::Transport(err.to_string()))?;
        Ok(Self {
            client,
            base_url: Arc::from(base_url.trim_end_matches('/')),
        })
    }

    async fn get<T>(&self, path: &'static str) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| ClientError::Snapshot {
                path: path.to_owned(),
                message: err.to_string(),
            })?;

        // Error statuses still carry the envelope.
        let envelope = response
            .json::<ApiResponse<T>>()
            .await
            .map_err(|err| ClientError::Decode(format!("{path}: {err}")))?;
        envelope.into_result().map_err(ClientError::Rejected)
    }
}

impl SnapshotSource for HttpSnapshotSource {
    fn fetch_queue(&self) -> BoxFuture<'static, Result<QueueSnapshot, ClientError>> {
        let source = self.clone();
        Box::pin(async move { source.get("/api/queue").await })
    }

    fn fetch_current_match(&self) -> BoxFuture<'static, Result<CurrentMatchResponse, ClientError>> {
        let source = self.clone();
        Box::pin(async move { source.get("/api/matches/current").await })
    }

    fn fetch_court_status(&self) -> BoxFuture<'static, Result<CourtStatusPayload, ClientError>> {
        let source = self.clone();
        Box::pin(async move { source.get("/api/court/status").await })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicUsize, Ordering},
    };

    use time::OffsetDateTime;
    use tokio::sync::oneshot;

    use super::*;
    use crate::state::court::CourtMode;

    /// In-memory snapshot surface; `hold` parks the next fetch until released.
    pub(crate) struct FakeSource {
        queue: Mutex<Result<QueueSnapshot, ClientError>>,
        current: Mutex<Result<CurrentMatchResponse, ClientError>>,
        court: Mutex<Result<CourtStatusPayload, ClientError>>,
        gate: Mutex<Option<oneshot::Receiver<()>>>,
        queue_fetches: AtomicUsize,
    }

    impl FakeSource {
        pub(crate) fn new() -> Arc<Self> {
            Arc::new(Self {
                queue: Mutex::new(Ok(QueueSnapshot::default())),
                current: Mutex::new(Ok(CurrentMatchResponse::default())),
                court: Mutex::new(Ok(CourtStatusPayload {
                    is_open: true,
                    current_time: OffsetDateTime::UNIX_EPOCH,
                    timezone: "UTC".into(),
                    mode: CourtMode::Regular,
                    active_matches: 0,
                    cooldown_end: None,
                    revision: 0,
                })),
                gate: Mutex::new(None),
                queue_fetches: AtomicUsize::new(0),
            })
        }

        pub(crate) fn set_queue(&self, value: Result<QueueSnapshot, ClientError>) {
            *self.queue.lock().unwrap_or_else(PoisonError::into_inner) = value;
        }

        pub(crate) fn set_current(&self, value: Result<CurrentMatchResponse, ClientError>) {
            *self.current.lock().unwrap_or_else(PoisonError::into_inner) = value;
        }

        pub(crate) fn set_court(&self, value: Result<CourtStatusPayload, ClientError>) {
            *self.court.lock().unwrap_or_else(PoisonError::into_inner) = value;
        }

        /// Park the next fetch until the returned sender fires.
        pub(crate) fn hold(&self) -> oneshot::Sender<()> {
            let (tx, rx) = oneshot::channel();
            *self.gate.lock().unwrap_or_else(PoisonError::into_inner) = Some(rx);
            tx
        }

        pub(crate) fn queue_fetches(&self) -> usize {
            self.queue_fetches.load(Ordering::SeqCst)
        }

        fn respond<T: Clone + Send + 'static>(
            &self,
            value: &Mutex<Result<T, ClientError>>,
        ) -> BoxFuture<'static, Result<T, ClientError>> {
            let gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner).take();
            let value = value.lock().unwrap_or_else(PoisonError::into_inner).clone();
            Box::pin(async move {
                if let Some(gate) = gate {
                    let _ = gate.await;
                }
                value
            })
        }
    }

    impl SnapshotSource for FakeSource {
        fn fetch_queue(&self) -> BoxFuture<'static, Result<QueueSnapshot, ClientError>> {
            self.queue_fetches.fetch_add(1, Ordering::SeqCst);
            self.respond(&self.queue)
        }

        fn fetch_current_match(&self) -> BoxFuture<'static, Result<CurrentMatchResponse, ClientError>> {
            self.respond(&self.current)
        }

        fn fetch_court_status(&self) -> BoxFuture<'static, Result<CourtStatusPayload, ClientError>> {
            self.respond(&self.court)
        }
    }
}
