use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Message;

/// A row-level change pushed by the backend's notification channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ChangeEvent {
    /// A new message row was inserted
    Insert(Message),
    /// An existing row changed (in practice: the read flag flipping)
    Update(Message),
    /// A row was removed; only the identifier survives
    Delete { id: Uuid },
}

impl ChangeEvent {
    /// Returns the (sender, receiver) pair when this event carries a full
    /// row. Delete events carry no participants and are matched by id.
    pub fn participants(&self) -> Option<(Uuid, Uuid)> {
        match self {
            Self::Insert(m) | Self::Update(m) => Some((m.sender_id, m.receiver_id)),
            Self::Delete { .. } => None,
        }
    }
}
