//! Peer lifecycle, peer manager liveness sweeping, and the Transport
//! contract.
//!
//! See `SPEC_FULL.md` §4.E and `DESIGN.md` for grounding.

pub mod manager;
pub mod peer;
pub mod transport;

pub use manager::{PeerEvent, PeerManager};
pub use peer::{Peer, PeerId};
pub use transport::{Transport, TransportEvent};
