//! Redb-backed durable store.
//!
//! Uses redb's ACID transactions for crash safety; history survives process
//! restarts. Messages are stored as JSON under a `(room, position)` composite
//! key so a range scan over one room yields append order.

use std::{path::Path, sync::Arc};

use redb::{Database, ReadableTable, TableDefinition};
use tradepost_proto::RoomKey;

use super::{MessageStore, StoreError, StoredMessage};

/// Table: messages
/// Key: (room key, position), position dense from 0 per room
/// Value: JSON-encoded `StoredMessage`
const MESSAGES: TableDefinition<(&str, u64), &[u8]> = TableDefinition::new("messages");

/// Table: message_counts
/// Key: room key
/// Value: number of messages stored, which is also the next position
const COUNTS: TableDefinition<&str, u64> = TableDefinition::new("message_counts");

/// Durable message history backed by redb.
///
/// Thread-safe through redb's internal locking. Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Open or create a redb database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = Database::create(path.as_ref()).map_err(io_err)?;

        let txn = db.begin_write().map_err(io_err)?;
        {
            let _ = txn.open_table(MESSAGES).map_err(io_err)?;
            let _ = txn.open_table(COUNTS).map_err(io_err)?;
        }
        txn.commit().map_err(io_err)?;

        Ok(Self { db: Arc::new(db) })
    }
}

impl MessageStore for RedbStore {
    fn append(&self, room: &RoomKey, message: &StoredMessage) -> Result<u64, StoreError> {
        let bytes = serde_json::to_vec(message)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let txn = self.db.begin_write().map_err(io_err)?;
        let position;
        {
            let mut counts = txn.open_table(COUNTS).map_err(io_err)?;
            position = counts.get(room.as_str()).map_err(io_err)?.map_or(0, |v| v.value());
            counts.insert(room.as_str(), position + 1).map_err(io_err)?;

            let mut messages = txn.open_table(MESSAGES).map_err(io_err)?;
            messages.insert((room.as_str(), position), bytes.as_slice()).map_err(io_err)?;
        }
        txn.commit().map_err(io_err)?;

        Ok(position)
    }

    fn list(
        &self,
        room: &RoomKey,
        offset: u64,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        let txn = self.db.begin_read().map_err(io_err)?;
        let table = txn.open_table(MESSAGES).map_err(io_err)?;

        let range = table
            .range((room.as_str(), offset)..=(room.as_str(), u64::MAX))
            .map_err(io_err)?;

        let mut messages = Vec::with_capacity(limit.min(64));
        for result in range {
            if messages.len() >= limit {
                break;
            }
            let (_, value) = result.map_err(io_err)?;
            let message: StoredMessage = serde_json::from_slice(value.value())
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            messages.push(message);
        }

        Ok(messages)
    }

    fn mark_read(&self, room: &RoomKey, reader: &str) -> Result<usize, StoreError> {
        let txn = self.db.begin_write().map_err(io_err)?;
        let updated;
        {
            let mut table = txn.open_table(MESSAGES).map_err(io_err)?;

            // Two passes inside the one transaction: collect the positions to
            // flip while the range iterator borrows the table, then write.
            let mut pending: Vec<(u64, Vec<u8>)> = Vec::new();
            {
                let range = table
                    .range((room.as_str(), 0)..=(room.as_str(), u64::MAX))
                    .map_err(io_err)?;
                for result in range {
                    let (key, value) = result.map_err(io_err)?;
                    let mut message: StoredMessage = serde_json::from_slice(value.value())
                        .map_err(|e| StoreError::Serialization(e.to_string()))?;
                    if !message.read && message.sender != reader {
                        message.read = true;
                        let bytes = serde_json::to_vec(&message)
                            .map_err(|e| StoreError::Serialization(e.to_string()))?;
                        pending.push((key.value().1, bytes));
                    }
                }
            }

            updated = pending.len();
            for (position, bytes) in pending {
                table.insert((room.as_str(), position), bytes.as_slice()).map_err(io_err)?;
            }
        }
        txn.commit().map_err(io_err)?;

        Ok(updated)
    }

    fn message_count(&self, room: &RoomKey) -> Result<u64, StoreError> {
        let txn = self.db.begin_read().map_err(io_err)?;
        let table = txn.open_table(COUNTS).map_err(io_err)?;
        Ok(table.get(room.as_str()).map_err(io_err)?.map_or(0, |v| v.value()))
    }
}

fn io_err(err: impl std::fmt::Display) -> StoreError {
    StoreError::Io(err.to_string())
}
