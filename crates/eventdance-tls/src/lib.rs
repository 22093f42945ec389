//! TLS session engine: a handshake-driven record layer built directly
//! on `rustls`, plus peer verification and a small background worker
//! pool for CPU-bound crypto work.
//!
//! See `SPEC_FULL.md` §4.C/§5 and `DESIGN.md` for grounding.

pub mod credentials;
pub mod session;
pub mod stream;
pub mod verify;
pub mod worker;

pub use credentials::{Credentials, CredentialsSlot};
pub use session::{Direction, TlsMode, TlsSession};
pub use stream::{tls_input_stack, tls_output_stack, TlsInputStack, TlsInputStream, TlsOutputStack, TlsOutputStream};
pub use verify::VerifyResult;
pub use worker::{JobHandle, WorkerPool};
