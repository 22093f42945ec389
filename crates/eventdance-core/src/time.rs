//! An injectable clock.
//!
//! Every time-driven behavior in `spec.md` — throttle per-second windows
//! (§4.B), reproxy idle-timeout calibration (§4.D), connect-timeout
//! (§4.A), and peer liveness sweeping (§4.E) — needs a source of "now"
//! that tests can control. Production code uses [`SystemClock`]; tests
//! use [`MockClock`] and advance it explicitly instead of sleeping.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock whose `now()` only changes when [`MockClock::advance`] is
/// called, for tests that assert on idle-timeout calibration or peer
/// sweeping without sleeping for real seconds.
#[derive(Clone)]
pub struct MockClock {
    inner: Arc<Mutex<Instant>>,
}

impl MockClock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.inner.lock().expect("mock clock mutex poisoned");
        *guard += by;
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        *self.inner.lock().expect("mock clock mutex poisoned")
    }
}

pub type SharedClock = Arc<dyn Clock>;
