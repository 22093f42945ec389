//! Bandwidth + latency throttling, `spec.md` §3/§4.B component C.
//!
//! A `Throttle` can be shared between multiple sockets (e.g. a
//! group-wide cap); `ThrottledInputStream`/`ThrottledOutputStream` in
//! `stream::throttled` consult every throttle attached to a socket and
//! take the minimum grant and the maximum delay across all of them.

use eventdance_core::config::ThrottleConfig;
use eventdance_core::time::{Clock, SharedClock};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// The result of asking a throttle how much of a requested transfer it
/// will allow right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grant {
    pub bytes: usize,
    pub delay: Duration,
}

struct Window {
    second_start: Instant,
    bytes_this_second: u64,
    last_op: Option<Instant>,
}

/// A single-direction rate limiter: `spec.md` §4.B's per-request
/// algorithm, consulted independently for the read and write
/// directions (hence `Throttle` holds one `Window` per direction it is
/// constructed for via `ThrottleDirection`).
pub struct Throttle {
    config: ThrottleConfig,
    clock: SharedClock,
    read_window: Mutex<Window>,
    write_window: Mutex<Window>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

impl Throttle {
    pub fn new(config: ThrottleConfig, clock: SharedClock) -> Self {
        let now = clock.now();
        let fresh_window = || Window {
            second_start: now,
            bytes_this_second: 0,
            last_op: None,
        };
        Self {
            config,
            clock,
            read_window: Mutex::new(fresh_window()),
            write_window: Mutex::new(fresh_window()),
        }
    }

    pub fn config(&self) -> ThrottleConfig {
        self.config
    }

    /// Requests up to `size` bytes of budget in `direction`, applying
    /// `spec.md` §4.B's algorithm:
    /// 1. if `latency > 0` and less than `latency` has elapsed since the
    ///    last op, grant 0 and report the remaining latency as a delay;
    /// 2. else if `bandwidth > 0`, grant `min(size, bandwidth_remaining)`
    ///    and, if short, report the remainder of the calendar second
    ///    (+1ms) as a delay;
    /// 3. else grant the full `size` unconditionally.
    pub fn request(&self, direction: Direction, size: usize) -> Grant {
        let (bandwidth, latency_micros, window_lock) = match direction {
            Direction::Read => (
                self.config.bandwidth_in,
                self.config.latency_in_micros,
                &self.read_window,
            ),
            Direction::Write => (
                self.config.bandwidth_out,
                self.config.latency_out_micros,
                &self.write_window,
            ),
        };

        let mut window = window_lock.lock().expect("throttle window mutex poisoned");
        let now = self.clock.now();

        if now.duration_since(window.second_start) >= Duration::from_secs(1) {
            window.second_start = now;
            window.bytes_this_second = 0;
        }

        if latency_micros > 0 {
            if let Some(last_op) = window.last_op {
                let elapsed = now.saturating_duration_since(last_op);
                let min_gap = Duration::from_micros(latency_micros);
                if elapsed < min_gap {
                    return Grant {
                        bytes: 0,
                        delay: min_gap - elapsed,
                    };
                }
            }
        }

        let grant_bytes = if bandwidth > 0 {
            let remaining = bandwidth.saturating_sub(window.bytes_this_second);
            (size as u64).min(remaining) as usize
        } else {
            size
        };

        window.last_op = Some(now);
        window.bytes_this_second += grant_bytes as u64;

        let delay = if bandwidth > 0 && grant_bytes < size {
            let elapsed_in_second = now.saturating_duration_since(window.second_start);
            let remaining_in_second = Duration::from_secs(1).saturating_sub(elapsed_in_second);
            remaining_in_second + Duration::from_millis(1)
        } else {
            Duration::ZERO
        };

        Grant {
            bytes: grant_bytes,
            delay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventdance_core::time::MockClock;
    use std::sync::Arc;

    #[test]
    fn unlimited_throttle_never_delays() {
        let clock = Arc::new(MockClock::new());
        let throttle = Throttle::new(ThrottleConfig::default(), clock);
        let grant = throttle.request(Direction::Read, 4096);
        assert_eq!(grant.bytes, 4096);
        assert_eq!(grant.delay, Duration::ZERO);
    }

    #[test]
    fn bandwidth_cap_is_enforced_per_calendar_second() {
        let clock = Arc::new(MockClock::new());
        let config = ThrottleConfig {
            bandwidth_in: 100,
            ..Default::default()
        };
        let throttle = Throttle::new(config, clock.clone());

        let first = throttle.request(Direction::Read, 80);
        assert_eq!(first.bytes, 80);

        let second = throttle.request(Direction::Read, 80);
        assert_eq!(second.bytes, 20);
        assert!(second.delay > Duration::ZERO);

        clock.advance(Duration::from_secs(1));
        let third = throttle.request(Direction::Read, 80);
        assert_eq!(third.bytes, 80);
    }

    #[test]
    fn latency_gap_blocks_until_elapsed() {
        let clock = Arc::new(MockClock::new());
        let config = ThrottleConfig {
            latency_in_micros: 5_000,
            ..Default::default()
        };
        let throttle = Throttle::new(config, clock.clone());

        let first = throttle.request(Direction::Read, 10);
        assert_eq!(first.bytes, 10);

        let second = throttle.request(Direction::Read, 10);
        assert_eq!(second.bytes, 0);
        assert!(second.delay > Duration::ZERO);

        clock.advance(Duration::from_millis(5));
        let third = throttle.request(Direction::Read, 10);
        assert_eq!(third.bytes, 10);
    }
}

#[cfg(test)]
mod properties {
    use super::*;
    use eventdance_core::time::MockClock;
    use proptest::prelude::*;
    use std::sync::Arc;

    proptest! {
        /// A single `request` call never grants more than was asked for,
        /// and never more than the configured per-second cap, no matter
        /// how the bandwidth/request sizes are chosen.
        #[test]
        fn grant_never_exceeds_request_or_bandwidth_cap(
            bandwidth in 1u64..1_000_000,
            requested in 0usize..2_000_000,
        ) {
            let clock = Arc::new(MockClock::new());
            let config = ThrottleConfig {
                bandwidth_in: bandwidth,
                ..Default::default()
            };
            let throttle = Throttle::new(config, clock);

            let grant = throttle.request(Direction::Read, requested);

            prop_assert!(grant.bytes <= requested);
            prop_assert!((grant.bytes as u64) <= bandwidth);
        }

        /// An unconfigured (zero) bandwidth cap always grants the full
        /// request with no delay, regardless of size.
        #[test]
        fn zero_bandwidth_means_unlimited(requested in 0usize..2_000_000) {
            let clock = Arc::new(MockClock::new());
            let throttle = Throttle::new(ThrottleConfig::default(), clock);

            let grant = throttle.request(Direction::Write, requested);

            prop_assert_eq!(grant.bytes, requested);
            prop_assert_eq!(grant.delay, Duration::ZERO);
        }
    }
}
