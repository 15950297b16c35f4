use tokio::task::JoinHandle;
use tracing::{debug, trace};

use torget_backend::Result;
use torget_types::events::ChangeEvent;

use crate::conversation::ConversationStore;
use crate::read_marker::ReadMarker;

/// Routes realtime change events into an open conversation.
///
/// Lifecycle is scoped to the screen: opened once both participant ids are
/// known, torn down unconditionally on close or drop. There is no
/// reconnect policy; a dropped subscription silently stops delivering
/// until the screen is reopened.
pub struct RealtimeBridge {
    pump: JoinHandle<()>,
}

impl RealtimeBridge {
    /// Subscribe to message changes and start routing matching rows into
    /// `store`. Inserts addressed to the local user are handed to the read
    /// marker immediately: the conversation is on screen, so the user has
    /// seen them.
    pub async fn open(store: ConversationStore, read_marker: ReadMarker) -> Result<Self> {
        let mut subscription = store.backend().subscribe_messages(None).await?;
        let pump = tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                route(&store, &read_marker, event).await;
            }
            debug!("conversation subscription closed");
        });
        Ok(Self { pump })
    }

    /// Tear the bridge down. Dropping the handle does the same.
    pub fn close(self) {
        self.pump.abort();
    }
}

impl Drop for RealtimeBridge {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

async fn route(store: &ConversationStore, read_marker: &ReadMarker, event: ChangeEvent) {
    match event {
        ChangeEvent::Insert(message) => {
            if !message.between(store.user(), store.peer()) {
                trace!("ignoring insert for another conversation");
                return;
            }
            let unread_for_me = message.receiver_id == store.user() && !message.read;
            let id = message.id;
            if store.append(message).await && unread_for_me {
                read_marker.enqueue(vec![id]);
            }
        }
        ChangeEvent::Update(message) => {
            if message.between(store.user(), store.peer()) {
                store.apply_update(message).await;
            }
        }
        ChangeEvent::Delete { id } => {
            store.remove_local(id).await;
        }
    }
}
