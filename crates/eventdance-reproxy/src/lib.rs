//! Reverse-proxy backend pool: bridge lifecycle, idle-timeout
//! calibration, and fair client pairing.
//!
//! See `SPEC_FULL.md` §4.D and `DESIGN.md` for grounding.

pub mod pool;

pub use pool::{BackendPool, BridgeDisposition, BridgeId, BridgeState, ClientId, Paired};
