pub mod bridge;
pub mod conversation;
pub mod inbox;
pub mod read_marker;
pub mod unread;

pub use bridge::RealtimeBridge;
pub use conversation::ConversationStore;
pub use inbox::{Inbox, InboxWatcher};
pub use read_marker::ReadMarker;
pub use unread::Thread;
