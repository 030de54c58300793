//! Tradepost relay core.
//!
//! Pure, transport-free logic for the marketplace chat relay. The
//! [`RelayDriver`] follows the Sans-IO pattern: the runtime feeds it
//! [`RelayEvent`]s and executes the [`RelayAction`]s it returns, so every
//! routing and lifecycle decision can be tested without a socket.
//!
//! # Components
//!
//! - [`RelayDriver`]: event-in/actions-out orchestrator (pure logic, no I/O)
//! - [`ConnectionRegistry`]: who is connected and which rooms they joined
//! - [`RoomRouter`]: room key to subscriber-set index
//! - [`MessageRelay`]: message validation and fan-out shaping
//! - [`Connection`]: per-connection lifecycle state machine
//! - [`HistoryBridge`]: durable history over a pluggable [`MessageStore`]
//! - [`Environment`]: time and randomness abstraction for deterministic tests

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod connection;
mod driver;
pub mod env;
mod error;
mod history;
mod registry;
mod relay;
mod router;
pub mod store;

pub use connection::{
    Connection, ConnectionConfig, ConnectionState, DEFAULT_HANDSHAKE_TIMEOUT,
    DEFAULT_IDLE_TIMEOUT, InvalidTransition,
};
pub use driver::{DriverConfig, RelayAction, RelayDriver, RelayEvent};
pub use env::Environment;
pub use error::{HistoryError, RelayError};
pub use history::{DEFAULT_PAGE_LIMIT, HistoryBridge, MAX_PAGE_LIMIT};
pub use registry::{ConnectionEntry, ConnectionRegistry};
pub use relay::{Delivery, MessageRelay};
pub use router::RoomRouter;
pub use store::{MemoryStore, MessageStore, RedbStore, StoreError, StoredMessage};

/// Runtime-assigned identifier for one live connection.
///
/// Ids are random, not sequential, so a reconnecting client never collides
/// with stale state from its previous session.
pub type ConnectionId = u64;
