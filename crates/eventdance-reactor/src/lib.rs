//! Reactor and socket engine: edge-triggered readiness, the socket
//! state machine, throttling, and the layered stream stack.
//!
//! See `SPEC_FULL.md` §4.A/§4.B for the behavior this crate implements
//! and `DESIGN.md` for what each module is grounded on.

pub mod address;
pub mod buffer_pool;
pub mod connection;
pub mod reactor;
pub mod slab;
pub mod socket;
pub mod stream;
pub mod throttle;

pub use address::EndpointAddr;
pub use buffer_pool::BufferPool;
pub use connection::Connection;
pub use reactor::{Reactor, ReactorHandler, SocketId, SocketSource};
pub use socket::{CloseMode, PendingAction, Socket, SocketState};
pub use throttle::{Direction, Grant, Throttle};
