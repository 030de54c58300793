//! In-memory store for tests, simulation, and single-process deployments
//! that can afford to lose history on restart.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use tradepost_proto::RoomKey;

use super::{MessageStore, StoreError, StoredMessage};

/// In-memory message history.
///
/// Messages are kept in append order per room behind an `Arc<Mutex<..>>`, so
/// clones share state. Lock poisoning is reported as an I/O error rather than
/// propagated as a panic.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<HashMap<RoomKey, Vec<StoredMessage>>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<RoomKey, Vec<StoredMessage>>>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::Io("store mutex poisoned".to_string()))
    }

    /// Number of rooms with at least one stored message.
    pub fn room_count(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.len())
    }
}

impl MessageStore for MemoryStore {
    fn append(&self, room: &RoomKey, message: &StoredMessage) -> Result<u64, StoreError> {
        let mut inner = self.lock()?;
        let messages = inner.entry(room.clone()).or_default();
        messages.push(message.clone());
        Ok(messages.len() as u64 - 1)
    }

    fn list(
        &self,
        room: &RoomKey,
        offset: u64,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        let inner = self.lock()?;
        let Some(messages) = inner.get(room) else {
            return Ok(Vec::new());
        };

        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(messages.len());
        let end = start.saturating_add(limit).min(messages.len());
        Ok(messages[start..end].to_vec())
    }

    fn mark_read(&self, room: &RoomKey, reader: &str) -> Result<usize, StoreError> {
        let mut inner = self.lock()?;
        let Some(messages) = inner.get_mut(room) else {
            return Ok(0);
        };

        let mut updated = 0;
        for message in messages.iter_mut() {
            if !message.read && message.sender != reader {
                message.read = true;
                updated += 1;
            }
        }
        Ok(updated)
    }

    fn message_count(&self, room: &RoomKey) -> Result<u64, StoreError> {
        Ok(self.lock()?.get(room).map_or(0, |messages| messages.len() as u64))
    }
}
