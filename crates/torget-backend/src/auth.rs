use std::sync::Arc;

use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, info};

use torget_types::api::{Session, TokenResponse};

use crate::error::{BackendError, Result};
use crate::BackendClient;

/// Refresh when the access token is this close to expiry.
const EXPIRY_LEEWAY_SECS: i64 = 60;

/// Cached session shared by every request path. Clones share state.
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<Option<Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn current(&self) -> Option<Session> {
        self.inner.read().await.clone()
    }

    pub async fn set(&self, session: Session) {
        *self.inner.write().await = Some(session);
    }

    pub async fn clear(&self) {
        *self.inner.write().await = None;
    }
}

impl BackendClient {
    /// Password grant. Caches and returns the issued session.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let session = self
            .token_grant("password", &json!({ "email": email, "password": password }))
            .await?;
        info!("signed in as {}", session.user_id);
        self.session.set(session.clone()).await;
        Ok(session)
    }

    /// Exchange the cached refresh token for a fresh session. Fails with
    /// `Unauthorized` when there is nothing to refresh.
    pub async fn refresh(&self) -> Result<Session> {
        let current = self
            .session
            .current()
            .await
            .ok_or(BackendError::Unauthorized { code: None })?;
        let session = self
            .token_grant(
                "refresh_token",
                &json!({ "refresh_token": current.refresh_token }),
            )
            .await?;
        debug!("session refreshed for {}", session.user_id);
        self.session.set(session.clone()).await;
        Ok(session)
    }

    /// Drop the cached session. Subsequent requests go out anonymous.
    pub async fn sign_out(&self) {
        self.session.clear().await;
    }

    /// The session to attach to an outgoing request, refreshed first when
    /// it is about to expire. `None` means anonymous.
    pub(crate) async fn ensure_session(&self) -> Result<Option<Session>> {
        match self.session.current().await {
            Some(s) if s.expires_within(EXPIRY_LEEWAY_SECS) => self.refresh().await.map(Some),
            other => Ok(other),
        }
    }

    async fn token_grant(&self, grant_type: &str, body: &serde_json::Value) -> Result<Session> {
        let endpoint = self.endpoint("auth/v1/token");
        let resp = self
            .http
            .post(&endpoint)
            .query(&[("grant_type", grant_type)])
            .header("apikey", &self.config.anon_key)
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if status.is_server_error() {
            return Err(BackendError::Protocol(format!("auth endpoint: HTTP {status}")));
        }
        if !status.is_success() {
            return Err(BackendError::Unauthorized { code: None });
        }

        let token: TokenResponse = resp.json().await?;
        Ok(token.into_session())
    }
}
