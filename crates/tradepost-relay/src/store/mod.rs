//! Message history storage.
//!
//! Trait-based abstraction over the durable room history. The trait is
//! synchronous; the relay fan-out path never calls into it, only the history
//! bridge does, from request handlers where a blocking call is acceptable.

mod error;
mod memory;
mod redb;

pub use error::StoreError;
pub use memory::MemoryStore;
use serde::{Deserialize, Serialize};
use tradepost_proto::RoomKey;

pub use self::redb::RedbStore;

/// One persisted room message.
///
/// Shared by direct-chat and forum rooms; `display_name` is only populated
/// for forum posts, where clients render it instead of the user id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    /// External user id of the author.
    pub sender: String,
    /// Display name, for forum posts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Message text, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Attached file reference, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Server-assigned send time, milliseconds since the Unix epoch.
    pub sent_at_ms: u64,
    /// Whether a counterparty has read the message.
    #[serde(default)]
    pub read: bool,
}

/// Storage abstraction for room message history.
///
/// Must be Clone (shared between request handlers), Send + Sync, and
/// synchronous. Implementations share internal state via Arc, so clones
/// operate on the same underlying store.
pub trait MessageStore: Clone + Send + Sync + 'static {
    /// Append a message to a room's history.
    ///
    /// Returns the position the message was stored at. Positions within a
    /// room are dense and start at zero.
    fn append(&self, room: &RoomKey, message: &StoredMessage) -> Result<u64, StoreError>;

    /// Load messages in range `[offset, offset + limit)`, oldest first.
    ///
    /// Past-the-end reads return an empty vec, not an error.
    fn list(
        &self,
        room: &RoomKey,
        offset: u64,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, StoreError>;

    /// Mark every message in the room not authored by `reader` as read.
    ///
    /// Returns how many messages flipped from unread to read. Idempotent:
    /// a repeated call returns zero.
    fn mark_read(&self, room: &RoomKey, reader: &str) -> Result<usize, StoreError>;

    /// Number of messages stored for a room. Zero for unknown rooms.
    fn message_count(&self, room: &RoomKey) -> Result<u64, StoreError>;
}
