use std::sync::Arc;

use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use torget_backend::{Backend, Result};
use torget_types::models::Message;

use crate::unread::{self, Thread};

/// Process-scoped message context: the full message set for the local
/// user plus the unread counts and thread grouping derived from it.
///
/// Constructed once after sign-in and passed down to every screen; torn
/// down never. Cheap to clone.
#[derive(Clone)]
pub struct Inbox {
    inner: Arc<InboxInner>,
}

struct InboxInner {
    backend: Arc<dyn Backend>,
    user: Uuid,
    messages: RwLock<Vec<Message>>,
    changed: watch::Sender<u64>,
}

impl Inbox {
    pub fn new(backend: Arc<dyn Backend>, user: Uuid) -> Self {
        let (changed, _) = watch::channel(0);
        Self {
            inner: Arc::new(InboxInner {
                backend,
                user,
                messages: RwLock::new(Vec::new()),
                changed,
            }),
        }
    }

    pub fn user(&self) -> Uuid {
        self.inner.user
    }

    /// Watch for refreshes. The value is a version counter.
    pub fn updates(&self) -> watch::Receiver<u64> {
        self.inner.changed.subscribe()
    }

    /// Full reload from the backend, newest first. The inbox never patches
    /// itself incrementally; a reload is cheap at this scale and keeps the
    /// list and the unread counts in sync by construction.
    pub async fn refresh(&self) -> Result<()> {
        let messages = self.inner.backend.inbox(self.inner.user).await?;
        {
            let mut current = self.inner.messages.write().await;
            *current = messages;
        }
        self.inner.changed.send_modify(|v| *v += 1);
        Ok(())
    }

    /// Conversations grouped by peer, ordered by latest activity.
    pub async fn threads(&self) -> Vec<Thread> {
        let messages = self.inner.messages.read().await;
        unread::threads(&messages, self.inner.user)
    }

    pub async fn unread_total(&self) -> usize {
        let messages = self.inner.messages.read().await;
        unread::unread_total(&messages, self.inner.user)
    }

    pub async fn unread_count_for(&self, peer: Uuid) -> usize {
        let messages = self.inner.messages.read().await;
        unread::unread_count_for(&messages, self.inner.user, peer)
    }

    pub async fn snapshot(&self) -> Vec<Message> {
        self.inner.messages.read().await.clone()
    }

    /// Coarse realtime watcher: any change to a row addressed to the local
    /// user triggers a full refresh. Returns the watcher handle; dropping
    /// it stops the refreshes. Like every subscription here, there is no
    /// auto-reconnect.
    pub async fn watch(&self) -> Result<InboxWatcher> {
        let filter = format!("receiver_id=eq.{}", self.inner.user);
        let mut subscription = self
            .inner
            .backend
            .subscribe_messages(Some(&filter))
            .await?;
        let inbox = self.clone();
        let pump = tokio::spawn(async move {
            while subscription.recv().await.is_some() {
                if let Err(err) = inbox.refresh().await {
                    warn!("inbox refresh failed: {err}");
                }
            }
            debug!("inbox subscription closed");
        });
        Ok(InboxWatcher { pump })
    }
}

/// Handle for the coarse inbox subscription.
pub struct InboxWatcher {
    pump: JoinHandle<()>,
}

impl InboxWatcher {
    pub fn close(self) {
        self.pump.abort();
    }
}

impl Drop for InboxWatcher {
    fn drop(&mut self) {
        self.pump.abort();
    }
}
