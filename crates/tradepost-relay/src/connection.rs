//! Per-connection lifecycle state machine.
//!
//! Pure state, no I/O: time is passed in and the caller executes whatever the
//! machine decides. One instance exists per live client connection, owned by
//! the driver.
//!
//! # State machine
//!
//! ```text
//! ┌────────────┐ establish ┌───────────┐  close/timeout  ┌───────────────┐
//! │ Connecting │──────────>│ Connected │────────────────>│ Disconnecting │
//! └────────────┘           └───────────┘                 └───────────────┘
//!       │                                                        │
//!       │ abort (handshake failure)                              │ close
//!       ↓                                                        ↓
//!  ┌────────┐                                               ┌────────┐
//!  │ Closed │<──────────────────────────────────────────────│ Closed │
//!  └────────┘                                               └────────┘
//! ```
//!
//! `Closed` is terminal. A connection id may be reused by a later, unrelated
//! handshake, but a closed machine is never resurrected; reconnection is
//! entirely client-driven (new id, re-issued joins).

use std::{
    ops::Sub,
    time::{Duration, Instant},
};

/// Time allowed for the transport handshake to complete.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum time without any inbound traffic before the connection is closed.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Transport handshake in progress; not yet in the registry.
    Connecting,
    /// Registered; eligible to join rooms and relay messages.
    Connected,
    /// Teardown in progress; the room cleanup cascade runs here.
    Disconnecting,
    /// Terminal.
    Closed,
}

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Timeout for completing the transport handshake.
    pub handshake_timeout: Duration,
    /// Idle window before a silent connection is disconnected.
    pub idle_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self { handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT, idle_timeout: DEFAULT_IDLE_TIMEOUT }
    }
}

/// Attempted transition not valid for the current state.
#[derive(Debug, thiserror::Error)]
#[error("cannot {operation} while {state:?}")]
pub struct InvalidTransition {
    /// State the connection was in.
    pub state: ConnectionState,
    /// Operation that was attempted.
    pub operation: &'static str,
}

/// Lifecycle state machine for one connection.
///
/// Generic over the instant type so the driver can run under virtual time in
/// tests.
#[derive(Debug, Clone)]
pub struct Connection<I = Instant>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    state: ConnectionState,
    config: ConnectionConfig,
    last_activity: I,
}

impl<I> Connection<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Create a new connection in [`ConnectionState::Connecting`].
    pub fn new(now: I, config: ConnectionConfig) -> Self {
        Self { state: ConnectionState::Connecting, config, last_activity: now }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Handshake completed; the connection is live.
    pub fn establish(&mut self, now: I) -> Result<(), InvalidTransition> {
        if self.state != ConnectionState::Connecting {
            return Err(InvalidTransition { state: self.state, operation: "establish" });
        }
        self.state = ConnectionState::Connected;
        self.last_activity = now;
        Ok(())
    }

    /// Handshake failed; `Connecting -> Closed` without ever registering.
    pub fn abort(&mut self) {
        self.state = ConnectionState::Closed;
    }

    /// Begin teardown. Idempotent: already-disconnecting or closed
    /// connections are left alone.
    ///
    /// Returns `true` if this call started the teardown.
    pub fn begin_disconnect(&mut self) -> bool {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Connected => {
                self.state = ConnectionState::Disconnecting;
                true
            },
            ConnectionState::Disconnecting | ConnectionState::Closed => false,
        }
    }

    /// Finish teardown. Terminal.
    pub fn close(&mut self) {
        self.state = ConnectionState::Closed;
    }

    /// Mark inbound traffic (resets the idle window).
    pub fn update_activity(&mut self, now: I) {
        self.last_activity = now;
    }

    /// Elapsed time since last activity if the state's timeout is exceeded.
    #[must_use]
    pub fn check_timeout(&self, now: I) -> Option<Duration> {
        let timeout = match self.state {
            ConnectionState::Connecting => self.config.handshake_timeout,
            ConnectionState::Connected => self.config.idle_timeout,
            ConnectionState::Disconnecting | ConnectionState::Closed => return None,
        };

        let elapsed = now - self.last_activity;
        if elapsed > timeout { Some(elapsed) } else { None }
    }

    /// Periodic maintenance. On timeout the connection moves to
    /// `Disconnecting` and the close reason is returned for the driver to
    /// act on; otherwise `None`.
    pub fn tick(&mut self, now: I) -> Option<String> {
        let elapsed = self.check_timeout(now)?;

        let reason = match self.state {
            ConnectionState::Connecting => format!("handshake timeout after {elapsed:?}"),
            _ => format!("idle timeout after {elapsed:?}"),
        };

        self.begin_disconnect();
        Some(reason)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_happy_path() {
        let t0 = Instant::now();
        let mut conn = Connection::new(t0, ConnectionConfig::default());
        assert_eq!(conn.state(), ConnectionState::Connecting);

        conn.establish(t0).unwrap();
        assert_eq!(conn.state(), ConnectionState::Connected);

        assert!(conn.begin_disconnect());
        assert_eq!(conn.state(), ConnectionState::Disconnecting);

        conn.close();
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[test]
    fn handshake_failure_goes_straight_to_closed() {
        let t0 = Instant::now();
        let mut conn = Connection::new(t0, ConnectionConfig::default());

        conn.abort();
        assert_eq!(conn.state(), ConnectionState::Closed);

        // A closed machine is never resurrected.
        assert!(conn.establish(t0).is_err());
        assert!(!conn.begin_disconnect());
    }

    #[test]
    fn idle_timeout_moves_to_disconnecting() {
        let t0 = Instant::now();
        let mut conn = Connection::new(t0, ConnectionConfig::default());
        conn.establish(t0).unwrap();

        let t1 = t0 + DEFAULT_IDLE_TIMEOUT + Duration::from_secs(1);
        let reason = conn.tick(t1).expect("should time out");
        assert!(reason.contains("idle timeout"));
        assert_eq!(conn.state(), ConnectionState::Disconnecting);

        // A second tick is a no-op; teardown is already running.
        assert!(conn.tick(t1).is_none());
    }

    #[test]
    fn activity_resets_idle_window() {
        let t0 = Instant::now();
        let mut conn = Connection::new(t0, ConnectionConfig::default());
        conn.establish(t0).unwrap();

        let t1 = t0 + Duration::from_secs(45);
        conn.update_activity(t1);

        // 50s after t0, but only 5s since last activity.
        let t2 = t0 + Duration::from_secs(50);
        assert!(conn.check_timeout(t2).is_none());
    }

    #[test]
    fn handshake_timeout_uses_its_own_window() {
        let t0 = Instant::now();
        let mut conn = Connection::new(t0, ConnectionConfig::default());

        let t1 = t0 + DEFAULT_HANDSHAKE_TIMEOUT + Duration::from_millis(1);
        let reason = conn.tick(t1).expect("handshake should time out");
        assert!(reason.contains("handshake timeout"));
    }

    #[test]
    fn establish_twice_is_an_error() {
        let t0 = Instant::now();
        let mut conn = Connection::new(t0, ConnectionConfig::default());
        conn.establish(t0).unwrap();

        let err = conn.establish(t0).unwrap_err();
        assert_eq!(err.operation, "establish");
    }
}
