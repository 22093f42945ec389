//! JSON-RPC framing/correlation engine and the D-Bus bridge wire
//! format.
//!
//! See `SPEC_FULL.md` §4.F/§6 and `DESIGN.md` for grounding.

pub mod boundary;
pub mod dbus;
pub mod engine;
pub mod message;

pub use boundary::JsonFrameDecoder;
pub use dbus::{BridgeError, Command, Frame};
pub use engine::{CallCompletion, CallTarget, JsonRpcEngine};
pub use message::{RequestMessage, ResponseMessage, ResponseShape};
