use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user profile. Read-mostly reference data owned by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    pub is_job_seeker: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Open,
    InProgress,
    Completed,
    Cancelled,
}

/// A marketplace listing. Opaque reference data as far as the messaging
/// core is concerned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    /// Price in øre.
    pub price: i64,
    pub location: String,
    pub category: String,
    pub status: JobStatus,
    pub created_by: Uuid,
    #[serde(default)]
    pub assigned_to: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub completion_deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub images: Vec<String>,
}

/// A direct message between two users.
///
/// The id and timestamp are assigned by the backend. The `read` flag only
/// ever transitions false -> true; rows are deleted only by explicit user
/// action on an own sent message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    #[serde(default)]
    pub job_id: Option<Uuid>,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
    #[serde(default)]
    pub image_url: Option<String>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// The conversation peer from `user`'s point of view, or `None` when
    /// `user` is not a participant.
    pub fn peer_of(&self, user: Uuid) -> Option<Uuid> {
        if self.sender_id == user {
            Some(self.receiver_id)
        } else if self.receiver_id == user {
            Some(self.sender_id)
        } else {
            None
        }
    }

    /// True when this message belongs to the conversation between `a` and `b`,
    /// in either direction.
    pub fn between(&self, a: Uuid, b: Uuid) -> bool {
        (self.sender_id == a && self.receiver_id == b)
            || (self.sender_id == b && self.receiver_id == a)
    }
}
