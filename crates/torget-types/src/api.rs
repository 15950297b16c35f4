use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// -- Auth --

/// An authenticated session issued by the backend. Tokens are opaque to
/// the client; expiry is tracked locally from the grant response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub user_id: Uuid,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// True when the access token expires within `leeway` seconds.
    pub fn expires_within(&self, leeway: i64) -> bool {
        self.expires_at - Utc::now() <= chrono::Duration::seconds(leeway)
    }
}

/// Raw token-grant response from the auth endpoint.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Seconds until the access token expires.
    pub expires_in: i64,
    pub user: TokenUser,
}

#[derive(Debug, Deserialize)]
pub struct TokenUser {
    pub id: Uuid,
}

impl TokenResponse {
    pub fn into_session(self) -> Session {
        Session {
            user_id: self.user.id,
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: Utc::now() + chrono::Duration::seconds(self.expires_in),
        }
    }
}

// -- Messages --

/// An outgoing message before the server has confirmed it. The
/// authoritative id, timestamp and read flag are assigned server-side.
#[derive(Debug, Clone, Serialize)]
pub struct MessageDraft {
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
    pub image_url: Option<String>,
}

impl MessageDraft {
    /// A draft is sendable when it has text content or an image.
    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty() && self.image_url.is_none()
    }
}

// -- Jobs --

#[derive(Debug, Clone, Serialize)]
pub struct JobDraft {
    pub title: String,
    pub description: String,
    pub price: i64,
    pub location: String,
    pub category: String,
    pub created_by: Uuid,
}

/// Declarative listing filters; all optional, combined with AND.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub category: Option<String>,
    pub search: Option<String>,
    pub location: Option<String>,
}

/// Partial job update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<crate::models::JobStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<Uuid>,
}

// -- Profiles --

/// Partial profile update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfilePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_job_seeker: Option<bool>,
}
