//! History bridge.
//!
//! Thin adapter between the HTTP history surface and the [`MessageStore`].
//! Deliberately decoupled from the relay fan-out path: real-time delivery
//! never waits on a durable write, and a persistence failure here surfaces
//! only to the HTTP caller.

use tradepost_proto::{RoomKey, has_message_body};

use crate::{
    error::HistoryError,
    store::{MessageStore, StoredMessage},
};

/// Page size used when the caller does not specify one.
pub const DEFAULT_PAGE_LIMIT: usize = 50;

/// Largest page a single request may fetch.
pub const MAX_PAGE_LIMIT: usize = 200;

/// Durable history operations over a [`MessageStore`].
#[derive(Debug, Clone)]
pub struct HistoryBridge<S: MessageStore> {
    store: S,
}

impl<S: MessageStore> HistoryBridge<S> {
    /// Create a bridge over a store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Persist a message to a room's history.
    ///
    /// Applies the same body rule as the relay: a message with neither text
    /// nor a file reference is rejected before it reaches the store.
    pub fn append(&self, room: &RoomKey, message: StoredMessage) -> Result<u64, HistoryError> {
        if !has_message_body(message.text.as_deref(), message.file.as_deref()) {
            return Err(HistoryError::InvalidMessage(
                "message needs text or a file reference".to_string(),
            ));
        }

        let position = self.store.append(room, &message)?;
        tracing::debug!(room = %room, position, "message persisted");
        Ok(position)
    }

    /// Load one page of a room's history, oldest first.
    ///
    /// `page` is 1-based; out-of-range values are clamped rather than
    /// rejected, so page 0 reads page 1 and an oversized limit reads
    /// [`MAX_PAGE_LIMIT`]. A page past the end is empty, not an error.
    pub fn list(
        &self,
        room: &RoomKey,
        page: Option<u64>,
        limit: Option<usize>,
    ) -> Result<Vec<StoredMessage>, HistoryError> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT);
        let page = page.unwrap_or(1).max(1);
        let offset = (page - 1).saturating_mul(limit as u64);

        Ok(self.store.list(room, offset, limit)?)
    }

    /// Mark every message in the room not authored by `reader` as read,
    /// returning how many flipped.
    pub fn mark_read(&self, room: &RoomKey, reader: &str) -> Result<usize, HistoryError> {
        let updated = self.store.mark_read(room, reader)?;
        if updated > 0 {
            tracing::debug!(room = %room, reader, updated, "messages marked read");
        }
        Ok(updated)
    }

    /// Number of messages stored for a room.
    pub fn message_count(&self, room: &RoomKey) -> Result<u64, HistoryError> {
        Ok(self.store.message_count(room)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn bridge() -> HistoryBridge<MemoryStore> {
        HistoryBridge::new(MemoryStore::new())
    }

    fn message(sender: &str, text: Option<&str>, file: Option<&str>) -> StoredMessage {
        StoredMessage {
            sender: sender.to_string(),
            display_name: None,
            text: text.map(str::to_string),
            file: file.map(str::to_string),
            sent_at_ms: 1_000,
            read: false,
        }
    }

    #[test]
    fn append_rejects_empty_body() {
        let bridge = bridge();
        let room = RoomKey::chat("trade-1");

        let result = bridge.append(&room, message("u1", None, None));
        assert!(matches!(result, Err(HistoryError::InvalidMessage(_))));

        let result = bridge.append(&room, message("u1", Some("   "), None));
        assert!(matches!(result, Err(HistoryError::InvalidMessage(_))));

        assert_eq!(bridge.message_count(&room).unwrap(), 0);
    }

    #[test]
    fn append_accepts_file_only() {
        let bridge = bridge();
        let room = RoomKey::chat("trade-1");
        assert_eq!(bridge.append(&room, message("u1", None, Some("img.png"))).unwrap(), 0);
    }

    #[test]
    fn list_clamps_page_and_limit() {
        let bridge = bridge();
        let room = RoomKey::chat("trade-1");
        for i in 0..5 {
            bridge.append(&room, message("u1", Some(&format!("m{i}")), None)).unwrap();
        }

        // Page 0 is read as page 1, limit 0 as limit 1.
        let page = bridge.list(&room, Some(0), Some(0)).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].text.as_deref(), Some("m0"));

        // Oversized limit clamps to the cap, still one page of everything.
        let page = bridge.list(&room, None, Some(10_000)).unwrap();
        assert_eq!(page.len(), 5);
    }

    #[test]
    fn list_pages_oldest_first() {
        let bridge = bridge();
        let room = RoomKey::forum("goal-7");
        for i in 0..5 {
            bridge.append(&room, message("u1", Some(&format!("m{i}")), None)).unwrap();
        }

        let page = bridge.list(&room, Some(2), Some(2)).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].text.as_deref(), Some("m2"));

        assert!(bridge.list(&room, Some(9), Some(2)).unwrap().is_empty());
    }

    #[test]
    fn mark_read_reports_flips() {
        let bridge = bridge();
        let room = RoomKey::chat("trade-1");
        bridge.append(&room, message("u1", Some("mine"), None)).unwrap();
        bridge.append(&room, message("u2", Some("theirs"), None)).unwrap();

        assert_eq!(bridge.mark_read(&room, "u1").unwrap(), 1);
        assert_eq!(bridge.mark_read(&room, "u1").unwrap(), 0);
    }
}
