//! Simulated environment.
//!
//! Monotonic time comes from tokio's clock, so tests running with a paused
//! runtime (`start_paused = true`) advance it deterministically. The wall
//! clock starts at a fixed origin and follows the virtual clock, with an
//! extra offset tests can push forwards or backwards to model skew.

use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicI64, Ordering},
    },
    time::Duration,
};

use chrono::{DateTime, TimeDelta, Utc};
use murmur_core::Environment;
use tokio::time::Instant;

/// Default wall-clock origin: 2023-11-14T22:13:20Z.
const WALL_ORIGIN_SECS: i64 = 1_700_000_000;

/// Simulation environment.
#[derive(Debug, Clone)]
pub struct SimEnv {
    origin: Instant,
    wall_origin: DateTime<Utc>,
    wall_offset_ms: Arc<AtomicI64>,
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl SimEnv {
    /// Create an environment anchored at the current virtual instant.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new() -> Self {
        Self::with_wall_origin(DateTime::UNIX_EPOCH + TimeDelta::seconds(WALL_ORIGIN_SECS))
    }

    /// Create an environment whose wall clock starts at `wall_origin`.
    pub fn with_wall_origin(wall_origin: DateTime<Utc>) -> Self {
        Self { origin: Instant::now(), wall_origin, wall_offset_ms: Arc::new(AtomicI64::new(0)) }
    }

    /// Virtual time elapsed since creation.
    pub fn elapsed(&self) -> Duration {
        Instant::now() - self.origin
    }

    /// Shift the wall clock without moving monotonic time.
    ///
    /// Negative values move it backwards (clock skew).
    pub fn skew_wall(&self, millis: i64) {
        self.wall_offset_ms.fetch_add(millis, Ordering::SeqCst);
    }

    /// Wall-clock origin.
    pub fn wall_origin(&self) -> DateTime<Utc> {
        self.wall_origin
    }
}

impl Environment for SimEnv {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        let elapsed_ms = i64::try_from(self.elapsed().as_millis()).unwrap_or(i64::MAX);
        let offset_ms = self.wall_offset_ms.load(Ordering::SeqCst);
        self.wall_origin + TimeDelta::milliseconds(elapsed_ms.saturating_add(offset_ms))
    }
}
