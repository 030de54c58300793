//! Relay error taxonomy.
//!
//! Everything here is isolated to the single event or connection that caused
//! it; no failure in this subsystem is fatal to the process. The cases that
//! are deliberately *not* errors:
//!
//! - an unknown room is an empty subscriber set (rooms exist only while
//!   subscribed);
//! - an idle timeout is a normal lifecycle transition, logged and handled by
//!   the connection state machine;
//! - a handshake failure never reaches the registry, so it surfaces only at
//!   the transport layer.

use crate::store::StoreError;

/// Failures while processing one message event.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Malformed message event. Rejected with an error event to the sender
    /// only; the connection and its rooms stay intact.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

/// Failures in the history bridge.
///
/// A persistence failure surfaces to the HTTP caller as a failed request; it
/// is never reported to real-time subscribers, who may already hold the
/// transient relay copy. That inconsistency window is accepted by design -
/// the durable write is the source of truth.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    /// The message carried neither text nor a file reference.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// The store could not complete the operation.
    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),
}
