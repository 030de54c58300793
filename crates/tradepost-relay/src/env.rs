//! Environment abstraction for deterministic testing.
//!
//! Decouples the relay from system resources (time, randomness) so the driver
//! can run under virtual time in tests and against real clocks in production.

use std::time::Duration;

/// Abstract environment providing time and randomness.
///
/// Implementations MUST guarantee that `now()` never goes backwards within a
/// single execution context, and that `random_bytes()` uses cryptographically
/// secure entropy in production (connection ids must be unguessable).
pub trait Environment: Clone + Send + Sync + 'static {
    /// The specific instant type used by this environment.
    ///
    /// Production environments use `std::time::Instant`; test environments
    /// may substitute virtual time.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current monotonic time.
    fn now(&self) -> Self::Instant;

    /// Current wall-clock time as Unix milliseconds.
    ///
    /// Used only for the server-assigned `sent_at_ms` stamps; never for
    /// timeout arithmetic, which must use the monotonic clock.
    fn wall_clock_ms(&self) -> u64;

    /// Fills the provided buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`, the connection id namespace.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }
}
