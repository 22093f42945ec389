//! Call context: the deadline/cancellation pair threaded through the
//! "legal suspension points" named in `spec.md` §5 — address resolution,
//! connect, and TLS credential readiness are the only operations allowed
//! to observe a cancellation or a deadline; everything else on the
//! reactor thread runs to completion without yielding.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A shared, cheaply-cloned cancellation flag.
///
/// Cloning a `Cancellation` shares the same underlying flag — cancelling
/// any clone cancels all of them. This is how a caller that owns a
/// [`CallContext`] can cancel an in-flight resolve from another part of
/// the program without needing a handle back into the reactor.
#[derive(Clone, Debug, Default)]
pub struct Cancellation {
    flag: Arc<AtomicBool>,
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// An absolute point in time after which an operation should be treated
/// as timed out. `Deadline::none()` means "no deadline".
#[derive(Clone, Copy, Debug)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn after(duration: Duration) -> Self {
        Self(Some(Instant::now() + duration))
    }

    pub fn at(instant: Instant) -> Self {
        Self(Some(instant))
    }

    pub fn is_expired(&self) -> bool {
        self.0.map(|at| Instant::now() >= at).unwrap_or(false)
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.0.map(|at| at.saturating_duration_since(Instant::now()))
    }
}

/// The deadline/cancellation pair a caller hands down into `connect`,
/// `resolve`, and TLS `starttls`.
///
/// Unlike the teacher's `CallContext` (which also threads budgets and
/// security classification through every call), EventDance-rs only needs
/// the two fields `spec.md` §5 actually names as legal suspension
/// points. Anything richer belongs in the application layer sitting on
/// top of this library, not in the reactor itself.
#[derive(Clone, Debug, Default)]
pub struct CallContext {
    cancellation: Cancellation,
    deadline: Deadline,
}

impl CallContext {
    pub fn new(cancellation: Cancellation, deadline: Deadline) -> Self {
        Self {
            cancellation,
            deadline,
        }
    }

    pub fn with_deadline(deadline: Deadline) -> Self {
        Self {
            cancellation: Cancellation::new(),
            deadline,
        }
    }

    pub fn cancellation(&self) -> &Cancellation {
        &self.cancellation
    }

    pub fn deadline(&self) -> Deadline {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_expired()
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_deadline_never_expires() {
        assert!(!Deadline::none().is_expired());
    }

    #[test]
    fn past_deadline_is_expired() {
        let deadline = Deadline::at(Instant::now() - Duration::from_secs(1));
        assert!(deadline.is_expired());
        assert_eq!(deadline.remaining(), Some(Duration::ZERO));
    }

    #[test]
    fn cancellation_is_shared_across_clones() {
        let cancellation = Cancellation::new();
        let clone = cancellation.clone();
        assert!(!clone.is_cancelled());
        cancellation.cancel();
        assert!(clone.is_cancelled());
    }
}
