pub mod auth;
pub mod error;
pub mod jobs;
pub mod messages;
pub mod realtime;
pub mod rest;

use async_trait::async_trait;
use uuid::Uuid;

use torget_types::api::{MessageDraft, Session};
use torget_types::models::{Message, Profile};

use crate::auth::SessionStore;

pub use crate::error::{BackendError, Result};
pub use crate::realtime::Subscription;
pub use crate::rest::Filter;

/// Connection settings for the hosted backend project.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Project base URL, e.g. `https://project.example.com`.
    pub url: String,
    /// Public anon key, sent as `apikey` on every request.
    pub anon_key: String,
}

/// Typed client for the hosted backend: auth grants, row CRUD with
/// declarative filter predicates, the message-insert procedure, and the
/// realtime change channel.
///
/// Cheap to clone; all clones share the HTTP pool and the session cache.
#[derive(Clone)]
pub struct BackendClient {
    pub(crate) http: reqwest::Client,
    pub(crate) config: BackendConfig,
    pub(crate) session: SessionStore,
}

impl BackendClient {
    pub fn new(config: BackendConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            session: SessionStore::new(),
        }
    }

    /// The cached session, if signed in.
    pub async fn session(&self) -> Option<Session> {
        self.session.current().await
    }

    /// The signed-in user's id, if any.
    pub async fn user_id(&self) -> Option<Uuid> {
        self.session.current().await.map(|s| s.user_id)
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.url.trim_end_matches('/'), path)
    }
}

/// The surface the sync core consumes from the external collaborator.
///
/// `BackendClient` is the production implementation; tests substitute an
/// in-memory one. Stores take `Arc<dyn Backend>` so the seam stays
/// injectable all the way down.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Full ordered (ascending by timestamp) history between two
    /// participants.
    async fn conversation(&self, a: Uuid, b: Uuid) -> Result<Vec<Message>>;

    /// Every message where `user` is sender or receiver, newest first.
    async fn inbox(&self, user: Uuid) -> Result<Vec<Message>>;

    /// Insert a message through the server-side procedure that enforces
    /// sender identity. Returns the confirmed row with the authoritative
    /// id and timestamp.
    async fn send_message(&self, draft: &MessageDraft) -> Result<Message>;

    /// One-way read transition, false -> true.
    async fn mark_read(&self, id: Uuid) -> Result<()>;

    /// Delete an own sent message.
    async fn delete_message(&self, id: Uuid) -> Result<()>;

    /// Look up a user profile.
    async fn profile(&self, id: Uuid) -> Result<Profile>;

    /// Open a change-notification subscription on the messages table,
    /// optionally narrowed by a row filter such as `receiver_id=eq.<id>`.
    async fn subscribe_messages(&self, filter: Option<&str>) -> Result<Subscription>;
}

#[async_trait]
impl Backend for BackendClient {
    async fn conversation(&self, a: Uuid, b: Uuid) -> Result<Vec<Message>> {
        BackendClient::conversation(self, a, b).await
    }

    async fn inbox(&self, user: Uuid) -> Result<Vec<Message>> {
        BackendClient::inbox(self, user).await
    }

    async fn send_message(&self, draft: &MessageDraft) -> Result<Message> {
        BackendClient::send_message(self, draft).await
    }

    async fn mark_read(&self, id: Uuid) -> Result<()> {
        BackendClient::mark_read(self, id).await
    }

    async fn delete_message(&self, id: Uuid) -> Result<()> {
        BackendClient::delete_message(self, id).await
    }

    async fn profile(&self, id: Uuid) -> Result<Profile> {
        BackendClient::profile(self, id).await
    }

    async fn subscribe_messages(&self, filter: Option<&str>) -> Result<Subscription> {
        self.subscribe("messages", filter).await
    }
}
