/// Integration tests: conversation store, realtime bridge and inbox wired
/// against an in-memory backend, with change events fed by hand so the
/// races the dedupe logic exists for can be played out deterministically.
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use torget_backend::{Backend, BackendError, Result, Subscription};
use torget_sync::{ConversationStore, Inbox, ReadMarker, RealtimeBridge};
use torget_types::api::MessageDraft;
use torget_types::events::ChangeEvent;
use torget_types::models::{Message, Profile};

/// In-memory stand-in for the hosted backend. Rows live in a Vec; change
/// events are only delivered when a test pushes them explicitly.
struct MemoryBackend {
    rows: Mutex<Vec<Message>>,
    subscribers: Mutex<Vec<mpsc::Sender<ChangeEvent>>>,
    fail_next_delete: AtomicBool,
    clock: AtomicI64,
}

impl MemoryBackend {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            rows: Mutex::new(Vec::new()),
            subscribers: Mutex::new(Vec::new()),
            fail_next_delete: AtomicBool::new(false),
            clock: AtomicI64::new(1_000),
        })
    }

    async fn seed(&self, messages: Vec<Message>) {
        self.rows.lock().await.extend(messages);
    }

    async fn row(&self, id: Uuid) -> Option<Message> {
        self.rows.lock().await.iter().find(|m| m.id == id).cloned()
    }

    /// Deliver a change event to every open subscription.
    async fn push(&self, event: ChangeEvent) {
        for tx in self.subscribers.lock().await.iter() {
            let _ = tx.send(event.clone()).await;
        }
    }

    fn next_timestamp(&self) -> chrono::DateTime<Utc> {
        let ts = self.clock.fetch_add(1, Ordering::SeqCst);
        Utc.timestamp_opt(ts, 0).unwrap()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn conversation(&self, a: Uuid, b: Uuid) -> Result<Vec<Message>> {
        let mut out: Vec<Message> = self
            .rows
            .lock()
            .await
            .iter()
            .filter(|m| m.between(a, b))
            .cloned()
            .collect();
        out.sort_by_key(|m| m.created_at);
        Ok(out)
    }

    async fn inbox(&self, user: Uuid) -> Result<Vec<Message>> {
        let mut out: Vec<Message> = self
            .rows
            .lock()
            .await
            .iter()
            .filter(|m| m.peer_of(user).is_some())
            .cloned()
            .collect();
        out.sort_by_key(|m| std::cmp::Reverse(m.created_at));
        Ok(out)
    }

    async fn send_message(&self, draft: &MessageDraft) -> Result<Message> {
        if draft.is_empty() {
            return Err(BackendError::Validation("empty message".into()));
        }
        let message = Message {
            id: Uuid::new_v4(),
            job_id: None,
            sender_id: draft.sender_id,
            receiver_id: draft.receiver_id,
            content: draft.content.clone(),
            image_url: draft.image_url.clone(),
            read: false,
            created_at: self.next_timestamp(),
        };
        self.rows.lock().await.push(message.clone());
        Ok(message)
    }

    async fn mark_read(&self, id: Uuid) -> Result<()> {
        if let Some(m) = self.rows.lock().await.iter_mut().find(|m| m.id == id) {
            m.read = true;
        }
        Ok(())
    }

    async fn delete_message(&self, id: Uuid) -> Result<()> {
        if self.fail_next_delete.swap(false, Ordering::SeqCst) {
            return Err(BackendError::Protocol("backend unavailable".into()));
        }
        self.rows.lock().await.retain(|m| m.id != id);
        Ok(())
    }

    async fn profile(&self, _id: Uuid) -> Result<Profile> {
        Err(BackendError::NotFound("profile"))
    }

    async fn subscribe_messages(&self, _filter: Option<&str>) -> Result<Subscription> {
        let (tx, subscription) = Subscription::channel(16);
        self.subscribers.lock().await.push(tx);
        Ok(subscription)
    }
}

fn msg(sender: Uuid, receiver: Uuid, read: bool, ts: i64) -> Message {
    Message {
        id: Uuid::new_v4(),
        job_id: None,
        sender_id: sender,
        receiver_id: receiver,
        content: "hei".into(),
        image_url: None,
        read,
        created_at: Utc.timestamp_opt(ts, 0).unwrap(),
    }
}

fn store_for(
    backend: &Arc<MemoryBackend>,
    user: Uuid,
    peer: Uuid,
) -> (ConversationStore, ReadMarker) {
    let marker = ReadMarker::new(backend.clone());
    let store = ConversationStore::new(backend.clone(), marker.clone(), user, peer);
    (store, marker)
}

async fn wait_for_len(store: &ConversationStore, n: usize) {
    for _ in 0..200 {
        if store.len().await == n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("store never reached {n} messages (at {})", store.len().await);
}

/// Long enough for anything already in flight to land.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn append_is_idempotent() {
    let backend = MemoryBackend::new();
    let (u1, u2) = (Uuid::new_v4(), Uuid::new_v4());
    let (store, _marker) = store_for(&backend, u1, u2);

    let m = msg(u2, u1, false, 100);
    assert!(store.append(m.clone()).await);
    assert!(!store.append(m).await);
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn append_rejects_other_conversations() {
    let backend = MemoryBackend::new();
    let (u1, u2, u3) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let (store, _marker) = store_for(&backend, u1, u2);

    assert!(!store.append(msg(u3, u1, false, 100)).await);
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn send_appends_once_despite_concurrent_push() {
    let backend = MemoryBackend::new();
    let (u1, u2) = (Uuid::new_v4(), Uuid::new_v4());
    let (store, marker) = store_for(&backend, u1, u2);
    let _bridge = RealtimeBridge::open(store.clone(), marker.clone())
        .await
        .unwrap();

    let confirmed = store.send("hei", None).await.unwrap();
    assert_eq!(store.len().await, 1);

    // The backend's push notification for the same row races the send
    // confirmation; here it loses the race and must be dropped.
    backend.push(ChangeEvent::Insert(confirmed.clone())).await;
    settle().await;

    let snapshot = store.snapshot().await;
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].id, confirmed.id);
}

#[tokio::test]
async fn push_before_send_resolution_is_also_deduped() {
    let backend = MemoryBackend::new();
    let (u1, u2) = (Uuid::new_v4(), Uuid::new_v4());
    let (store, marker) = store_for(&backend, u1, u2);
    let _bridge = RealtimeBridge::open(store.clone(), marker.clone())
        .await
        .unwrap();

    // This time the push wins the race: the row arrives as an event first,
    // then the send path tries to append its confirmed copy.
    let row = msg(u1, u2, false, 100);
    backend.push(ChangeEvent::Insert(row.clone())).await;
    wait_for_len(&store, 1).await;

    assert!(!store.append(row).await);
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn empty_draft_is_rejected_without_touching_state() {
    let backend = MemoryBackend::new();
    let (u1, u2) = (Uuid::new_v4(), Uuid::new_v4());
    let (store, _marker) = store_for(&backend, u1, u2);

    let err = store.send("   ", None).await.unwrap_err();
    assert!(matches!(err, BackendError::Validation(_)));
    assert!(store.is_empty().await);
    assert!(backend.rows.lock().await.is_empty());
}

#[tokio::test]
async fn load_marks_unread_messages_read_best_effort() {
    let backend = MemoryBackend::new();
    let (u1, u2) = (Uuid::new_v4(), Uuid::new_v4());
    let m1 = msg(u2, u1, false, 100);
    backend.seed(vec![m1.clone()]).await;

    let (store, marker) = store_for(&backend, u1, u2);
    store.load().await.unwrap();
    assert_eq!(store.len().await, 1);

    // The read updates are fire-and-forget; wait for them to land and
    // check the authoritative copy flipped.
    marker.settled().await;
    assert!(backend.row(m1.id).await.unwrap().read);
}

#[tokio::test]
async fn failed_delete_resynchronizes_to_backend_state() {
    let backend = MemoryBackend::new();
    let (u1, u2) = (Uuid::new_v4(), Uuid::new_v4());
    let m1 = msg(u1, u2, true, 100);
    let m2 = msg(u2, u1, true, 200);
    backend.seed(vec![m1.clone(), m2.clone()]).await;

    let (store, _marker) = store_for(&backend, u1, u2);
    store.load().await.unwrap();

    backend.fail_next_delete.store(true, Ordering::SeqCst);
    let err = store.remove(m1.id).await.unwrap_err();
    assert!(matches!(err, BackendError::Protocol(_)));

    // Self-healing: the store equals a fresh load of the conversation.
    let expected = backend.conversation(u1, u2).await.unwrap();
    let snapshot = store.snapshot().await;
    assert_eq!(
        snapshot.iter().map(|m| m.id).collect::<Vec<_>>(),
        expected.iter().map(|m| m.id).collect::<Vec<_>>(),
    );
    assert_eq!(snapshot.len(), 2);
}

#[tokio::test]
async fn successful_delete_removes_everywhere() {
    let backend = MemoryBackend::new();
    let (u1, u2) = (Uuid::new_v4(), Uuid::new_v4());
    let m1 = msg(u1, u2, true, 100);
    backend.seed(vec![m1.clone()]).await;

    let (store, _marker) = store_for(&backend, u1, u2);
    store.load().await.unwrap();

    store.remove(m1.id).await.unwrap();
    assert!(store.is_empty().await);
    assert!(backend.row(m1.id).await.is_none());
}

#[tokio::test]
async fn bridge_ignores_other_participant_pairs() {
    let backend = MemoryBackend::new();
    let (u1, u2, u3) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let (store, marker) = store_for(&backend, u1, u2);
    let _bridge = RealtimeBridge::open(store.clone(), marker.clone())
        .await
        .unwrap();

    backend.push(ChangeEvent::Insert(msg(u3, u1, false, 100))).await;
    settle().await;
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn bridge_marks_incoming_messages_read() {
    let backend = MemoryBackend::new();
    let (u1, u2) = (Uuid::new_v4(), Uuid::new_v4());
    let (store, marker) = store_for(&backend, u1, u2);
    let _bridge = RealtimeBridge::open(store.clone(), marker.clone())
        .await
        .unwrap();

    let incoming = msg(u2, u1, false, 100);
    backend.seed(vec![incoming.clone()]).await;
    backend.push(ChangeEvent::Insert(incoming.clone())).await;
    wait_for_len(&store, 1).await;

    marker.settled().await;
    assert!(backend.row(incoming.id).await.unwrap().read);
}

#[tokio::test]
async fn bridge_applies_read_flag_updates_in_place() {
    let backend = MemoryBackend::new();
    let (u1, u2) = (Uuid::new_v4(), Uuid::new_v4());
    let mut sent = msg(u1, u2, false, 100);
    backend.seed(vec![sent.clone()]).await;

    let (store, marker) = store_for(&backend, u1, u2);
    store.load().await.unwrap();
    let _bridge = RealtimeBridge::open(store.clone(), marker.clone())
        .await
        .unwrap();

    // Peer read our message; the update event flips the local copy.
    sent.read = true;
    backend.push(ChangeEvent::Update(sent.clone())).await;
    for _ in 0..200 {
        if store.snapshot().await[0].read {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(store.snapshot().await[0].read);
}

#[tokio::test]
async fn bridge_applies_peer_deletes() {
    let backend = MemoryBackend::new();
    let (u1, u2) = (Uuid::new_v4(), Uuid::new_v4());
    let theirs = msg(u2, u1, true, 100);
    backend.seed(vec![theirs.clone()]).await;

    let (store, marker) = store_for(&backend, u1, u2);
    store.load().await.unwrap();
    let _bridge = RealtimeBridge::open(store.clone(), marker.clone())
        .await
        .unwrap();

    backend.push(ChangeEvent::Delete { id: theirs.id }).await;
    wait_for_len(&store, 0).await;
}

#[tokio::test]
async fn closed_bridge_stops_delivery() {
    let backend = MemoryBackend::new();
    let (u1, u2) = (Uuid::new_v4(), Uuid::new_v4());
    let (store, marker) = store_for(&backend, u1, u2);
    let bridge = RealtimeBridge::open(store.clone(), marker.clone())
        .await
        .unwrap();

    bridge.close();
    settle().await;

    backend.push(ChangeEvent::Insert(msg(u2, u1, false, 100))).await;
    settle().await;
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn inbox_watch_refreshes_on_any_change() {
    let backend = MemoryBackend::new();
    let (u1, u2) = (Uuid::new_v4(), Uuid::new_v4());
    let m1 = msg(u2, u1, false, 100);
    backend.seed(vec![m1.clone()]).await;

    let inbox = Inbox::new(backend.clone(), u1);
    inbox.refresh().await.unwrap();
    assert_eq!(inbox.unread_total().await, 1);
    assert_eq!(inbox.threads().await.len(), 1);

    let _watcher = inbox.watch().await.unwrap();

    // The read flag flips server-side; the coarse subscription reloads
    // the whole list and the unread count follows.
    backend.mark_read(m1.id).await.unwrap();
    let updated = backend.row(m1.id).await.unwrap();
    backend.push(ChangeEvent::Update(updated)).await;

    for _ in 0..200 {
        if inbox.unread_total().await == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(inbox.unread_total().await, 0);
}
