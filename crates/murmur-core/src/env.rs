//! Environment abstraction for deterministic testing.
//!
//! Decouples sync logic from system resources (monotonic time, wall clock,
//! sleeping). Enables deterministic simulation with a paused tokio clock and
//! production use with real system resources.

use std::{
    fmt::Debug,
    future::Future,
    ops::{Add, Sub},
    time::Duration,
};

use chrono::{DateTime, Utc};

/// Abstract environment providing time and async sleeping.
///
/// Implementations MUST guarantee that `now()` never goes backwards.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Monotonic instant type.
    ///
    /// Production uses `std::time::Instant`; simulation uses tokio's pausable
    /// clock so timers can be driven deterministically.
    type Instant: Copy
        + Ord
        + Debug
        + Send
        + Sync
        + Sub<Output = Duration>
        + Add<Duration, Output = Self::Instant>;

    /// Current monotonic time.
    ///
    /// # Invariants
    ///
    /// - Subsequent calls return values `>=` previous calls.
    fn now(&self) -> Self::Instant;

    /// Sleeps for the specified duration.
    ///
    /// Only runtime code (timer producers) awaits this; state machines take
    /// time as input instead.
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;

    /// Current wall-clock time, used to stamp optimistic messages.
    fn wall_clock(&self) -> DateTime<Utc>;
}

/// Production environment.
///
/// Monotonic time from `std::time::Instant`, sleeping through tokio and the
/// wall clock from the OS.
#[derive(Debug, Clone, Copy, Default)]
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

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    #[allow(clippy::disallowed_methods)]
    fn wall_clock(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_env_time_advances() {
        let env = SystemEnv::new();

        let t1 = env.now();
        std::thread::sleep(Duration::from_millis(5));
        let t2 = env.now();

        assert!(t2 > t1);
        assert!(t2 - t1 >= Duration::from_millis(5));
    }

    #[tokio::test(start_paused = true)]
    async fn system_env_sleep_uses_tokio_timer() {
        let env = SystemEnv::new();
        let before = tokio::time::Instant::now();

        env.sleep(Duration::from_secs(3)).await;

        assert!(tokio::time::Instant::now() - before >= Duration::from_secs(3));
    }
}
