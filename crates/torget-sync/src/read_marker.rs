use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use tracing::warn;
use uuid::Uuid;

use torget_backend::Backend;

/// Best-effort mark-as-read queue.
///
/// Every id becomes one fire-and-forget update against the backend:
/// failures are logged and dropped, never retried, and the local read
/// assumption is never rolled back. A missed update self-corrects on the
/// next full reload. Cheap to clone.
#[derive(Clone)]
pub struct ReadMarker {
    inner: Arc<MarkerInner>,
}

struct MarkerInner {
    backend: Arc<dyn Backend>,
    in_flight: AtomicUsize,
    settled: Notify,
}

impl ReadMarker {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            inner: Arc::new(MarkerInner {
                backend,
                in_flight: AtomicUsize::new(0),
                settled: Notify::new(),
            }),
        }
    }

    /// Spawn one read update per id and return immediately. Nothing blocks
    /// on completion and nothing observes the outcome beyond a log line.
    pub fn enqueue(&self, ids: Vec<Uuid>) {
        for id in ids {
            let inner = self.inner.clone();
            inner.in_flight.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                if let Err(err) = inner.backend.mark_read(id).await {
                    warn!(%id, "mark-read dropped: {err}");
                }
                if inner.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
                    inner.settled.notify_waiters();
                }
            });
        }
    }

    /// Updates still in flight.
    pub fn pending(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Wait until every enqueued update has resolved. Test hook; the
    /// production paths never wait.
    pub async fn settled(&self) {
        loop {
            let notified = self.inner.settled.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}
