//! Shared kernel for the EventDance workspace: error taxonomy, call
//! context, configuration, clock, the readiness condition mask, and the
//! stream-layer contract every higher crate composes against.
//!
//! See `SPEC_FULL.md` for how this maps onto the specification and
//! `DESIGN.md` for what each piece is grounded on.

pub mod condition;
pub mod config;
pub mod context;
pub mod error;
pub mod stream;
pub mod time;

pub use condition::Condition;
pub use context::{CallContext, Cancellation, Deadline};
pub use error::{CoreError, ErrorCategory, Result};
pub use time::{Clock, MockClock, SharedClock, SystemClock};
