use std::sync::Arc;

use tokio::sync::{watch, RwLock};
use tracing::warn;
use uuid::Uuid;

use torget_backend::{Backend, BackendError, Result};
use torget_types::api::MessageDraft;
use torget_types::models::Message;

use crate::read_marker::ReadMarker;
use crate::unread;

/// In-memory message list for one conversation between the local user and
/// a single peer.
///
/// The store exclusively owns its list for the screen's lifetime: it is
/// discarded on unmount and rebuilt from a full reload next time. Cheap to
/// clone; all clones share the same list.
#[derive(Clone)]
pub struct ConversationStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    backend: Arc<dyn Backend>,
    read_marker: ReadMarker,
    user: Uuid,
    peer: Uuid,
    messages: RwLock<Vec<Message>>,
    /// Version counter bumped on every mutation, for render loops.
    changed: watch::Sender<u64>,
}

impl ConversationStore {
    pub fn new(
        backend: Arc<dyn Backend>,
        read_marker: ReadMarker,
        user: Uuid,
        peer: Uuid,
    ) -> Self {
        let (changed, _) = watch::channel(0);
        Self {
            inner: Arc::new(StoreInner {
                backend,
                read_marker,
                user,
                peer,
                messages: RwLock::new(Vec::new()),
                changed,
            }),
        }
    }

    pub fn user(&self) -> Uuid {
        self.inner.user
    }

    pub fn peer(&self) -> Uuid {
        self.inner.peer
    }

    pub fn backend(&self) -> Arc<dyn Backend> {
        self.inner.backend.clone()
    }

    /// Watch for mutations. The value is a version counter; receivers only
    /// care that it moved.
    pub fn updates(&self) -> watch::Receiver<u64> {
        self.inner.changed.subscribe()
    }

    /// Replace local state with the full ascending history, then hand every
    /// unread message addressed to the local user to the read marker.
    /// Rendering never blocks on the read updates; their results converge
    /// through change events or the next reload.
    pub async fn load(&self) -> Result<()> {
        let history = self
            .inner
            .backend
            .conversation(self.inner.user, self.inner.peer)
            .await?;
        let unread: Vec<Uuid> = history
            .iter()
            .filter(|m| m.receiver_id == self.inner.user && !m.read)
            .map(|m| m.id)
            .collect();
        {
            let mut messages = self.inner.messages.write().await;
            *messages = history;
        }
        self.bump();
        self.inner.read_marker.enqueue(unread);
        Ok(())
    }

    /// Append one message iff its id is not already present and it belongs
    /// to this conversation. Returns whether anything changed.
    ///
    /// Ordering between "send resolves" and "push event for the same row
    /// arrives" is not guaranteed; the id check carries that race.
    pub async fn append(&self, message: Message) -> bool {
        if !message.between(self.inner.user, self.inner.peer) {
            return false;
        }
        let appended = {
            let mut messages = self.inner.messages.write().await;
            if messages.iter().any(|m| m.id == message.id) {
                false
            } else {
                messages.push(message);
                true
            }
        };
        if appended {
            self.bump();
        }
        appended
    }

    /// Send a draft through the collaborator's insert procedure and append
    /// the server-confirmed record. Local state is untouched on failure.
    pub async fn send(&self, content: &str, image_url: Option<String>) -> Result<Message> {
        let draft = MessageDraft {
            sender_id: self.inner.user,
            receiver_id: self.inner.peer,
            content: content.trim().to_string(),
            image_url,
        };
        if draft.is_empty() {
            return Err(BackendError::Validation(
                "a message needs text or an image".into(),
            ));
        }
        let confirmed = self.inner.backend.send_message(&draft).await?;
        self.append(confirmed.clone()).await;
        Ok(confirmed)
    }

    /// Optimistic delete: drop the message locally, then tell the backend.
    /// When the backend call fails the whole conversation is reloaded, so
    /// no diverged local state survives a failed delete.
    pub async fn remove(&self, id: Uuid) -> Result<()> {
        {
            let mut messages = self.inner.messages.write().await;
            messages.retain(|m| m.id != id);
        }
        self.bump();
        if let Err(err) = self.inner.backend.delete_message(id).await {
            warn!(%id, "delete failed, resynchronizing: {err}");
            if let Err(reload_err) = self.load().await {
                warn!("resync after failed delete also failed: {reload_err}");
            }
            return Err(err);
        }
        Ok(())
    }

    /// Drop a message locally without calling the backend. Applied when a
    /// delete arrives as a change event.
    pub async fn remove_local(&self, id: Uuid) -> bool {
        let removed = {
            let mut messages = self.inner.messages.write().await;
            let before = messages.len();
            messages.retain(|m| m.id != id);
            messages.len() != before
        };
        if removed {
            self.bump();
        }
        removed
    }

    /// Replace a message in place (the read-flag transition arriving as a
    /// change event). No-op for unknown ids.
    pub async fn apply_update(&self, message: Message) -> bool {
        let applied = {
            let mut messages = self.inner.messages.write().await;
            match messages.iter_mut().find(|m| m.id == message.id) {
                Some(slot) => {
                    *slot = message;
                    true
                }
                None => false,
            }
        };
        if applied {
            self.bump();
        }
        applied
    }

    /// Clone of the current ordered list, for rendering.
    pub async fn snapshot(&self) -> Vec<Message> {
        self.inner.messages.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.inner.messages.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.messages.read().await.is_empty()
    }

    /// Unread messages from the peer, addressed to the local user.
    pub async fn unread_from_peer(&self) -> usize {
        let messages = self.inner.messages.read().await;
        unread::unread_count_for(&messages, self.inner.user, self.inner.peer)
    }

    fn bump(&self) {
        self.inner.changed.send_modify(|v| *v += 1);
    }
}
