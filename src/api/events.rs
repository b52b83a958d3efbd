use crate::api::models::{AuthUser, Message};
use serde_json::Value;

/// A change to one child of a watched collection, as reported by the
/// realtime database stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ChildEvent {
    Added { key: String, value: Value },
    Changed { key: String },
    Removed { key: String },
    Moved { key: String },
    /// The backend closed the stream (`cancel`, `auth_revoked`, transport error).
    Cancelled(String),
}

/// Output of a feed listener, tagged with the epoch of the listener that
/// produced it so events from a detached listener can be dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncEvent {
    pub epoch: u64,
    pub kind: SyncEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncEventKind {
    Appended(Message),
    Closed(String),
}

/// Everything that reaches the session controller from outside the UI thread.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    AuthStateChanged(Option<AuthUser>),
    Feed(SyncEvent),
    PhotoUploaded { epoch: u64, url: String },
    ConfigFetched { max_message_length: i64 },
}
