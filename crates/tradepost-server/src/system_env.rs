//! Production Environment implementation using system time and RNG.
//!
//! # Panics
//!
//! Panics if the OS RNG fails. This is intentional: connection ids must be
//! unguessable, and a server without functioning cryptographic randomness
//! cannot hand them out safely. RNG failure indicates OS-level breakage.

use tradepost_relay::Environment;

/// Production environment using system time and cryptographic RNG.
///
/// Uses `std::time::Instant::now()` for timeout arithmetic,
/// `std::time::SystemTime` for the wall-clock message stamps, and getrandom
/// for connection ids.
#[derive(Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = std::time::Instant;

    #[allow(clippy::disallowed_methods)]
    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    #[allow(clippy::expect_used)]
    fn wall_clock_ms(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("invariant: system clock is after Unix epoch (1970-01-01)")
            .as_millis() as u64
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer)
            .expect("invariant: OS RNG failure is unrecoverable - ids would be guessable");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_u64_is_not_constant() {
        let env = SystemEnv::new();
        let a = env.random_u64();
        let b = env.random_u64();
        // Vanishingly unlikely to collide; a constant would indicate a
        // broken RNG wiring.
        assert_ne!(a, b);
    }

    #[test]
    fn wall_clock_is_past_2020() {
        let env = SystemEnv::new();
        assert!(env.wall_clock_ms() > 1_577_836_800_000);
    }
}
