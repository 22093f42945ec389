//! Stable error domain shared by every EventDance crate.
//!
//! `spec.md` §7 distinguishes five error classes — Transient, Recoverable,
//! Peer-local, Resource, Programmer — and says each surfaces differently:
//! transient errors are swallowed and retried on the next readiness edge,
//! recoverable ones schedule a resumption, peer-local ones close one
//! connection without affecting others, resource errors propagate to the
//! requester, and programmer errors fail fast. [`CoreError`] carries the
//! classification as data so a default handler can dispatch on it instead
//! of every call site re-deriving the policy from the error code.

use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt;

/// Where a [`CoreError`] sits in the taxonomy from `spec.md` §7.
///
/// The classification is advisory metadata, not behavior: nothing in this
/// crate panics or retries based on it by itself, but every higher layer
/// (the reactor's condition dispatch, the JSON-RPC completion path, the
/// reproxy pool's bridge-error handler) consults it to decide whether to
/// retry silently, surface to one peer, or propagate to the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
    /// WouldBlock/EAGAIN and handshake-would-block. Never surfaced to a
    /// caller; the reactor retries implicitly on the next readiness edge.
    Transient,
    /// A throttle delay or "credentials not ready yet" condition. Not an
    /// error from the application's point of view — a resumption is
    /// already scheduled.
    Recoverable,
    /// Invalid message, protocol violation, unknown command. Surfaced on
    /// the offending connection only; other peers are unaffected.
    PeerLocal,
    /// Resolve failure, connect refused, handshake failure, out of fds.
    /// Surfaced to the requester; the owning socket transitions to Closed.
    Resource,
    /// Null arguments, invalid state transition requested by the caller.
    /// Indicates a bug in the caller; debug builds assert, release builds
    /// still return a `CoreError` rather than silently succeeding.
    Programmer,
}

/// The stable, cross-crate error type.
///
/// `code` is a `<domain>.<reason>` string meant to be stable across
/// versions (suitable for metrics labels and log grepping); `message` is
/// for humans; `cause` threads through the underlying `std::io::Error` or
/// similar when one exists.
#[derive(Debug)]
pub struct CoreError {
    code: &'static str,
    message: Cow<'static, str>,
    category: ErrorCategory,
    cause: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl CoreError {
    pub fn new(code: &'static str, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            message: message.into(),
            category: ErrorCategory::Resource,
            cause: None,
        }
    }

    pub fn with_category(mut self, category: ErrorCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_cause(mut self, cause: impl StdError + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn category(&self) -> ErrorCategory {
        self.category
    }

    /// Constructs a `Programmer`-category error and, in debug builds,
    /// asserts instead — per §7, programmer errors are "never reached in
    /// correct code" and should fail loudly while developing.
    #[track_caller]
    pub fn programmer(code: &'static str, message: impl Into<Cow<'static, str>>) -> Self {
        let message = message.into();
        debug_assert!(false, "programmer error [{code}]: {message}");
        Self::new(code, message).with_category(ErrorCategory::Programmer)
    }

    pub fn from_io(code: &'static str, err: std::io::Error) -> Self {
        let category = match err.kind() {
            std::io::ErrorKind::WouldBlock => ErrorCategory::Transient,
            _ => ErrorCategory::Resource,
        };
        Self::new(code, err.to_string())
            .with_category(category)
            .with_cause(err)
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?}): {}", self.code, self.category, self.message)
    }
}

impl StdError for CoreError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause
            .as_ref()
            .map(|c| c.as_ref() as &(dyn StdError + 'static))
    }
}

/// Stable error codes, namespaced by the subsystem that raises them.
///
/// Keeping these as constants (rather than ad hoc string literals at every
/// call site) is what lets a metrics pipeline or a support runbook key off
/// a fixed, documented vocabulary instead of free text that drifts.
pub mod codes {
    pub const SOCKET_RESOLVE_FAILED: &str = "socket.resolve_failed";
    pub const SOCKET_RESOLVE_CANCELLED: &str = "socket.resolve_cancelled";
    pub const SOCKET_CONNECT_REFUSED: &str = "socket.connect_refused";
    pub const SOCKET_CONNECT_TIMEOUT: &str = "socket.connect_timeout";
    pub const SOCKET_UNKNOWN_ERROR: &str = "socket.unknown_error";
    pub const SOCKET_INVALID_TRANSITION: &str = "socket.invalid_transition";
    pub const SOCKET_BIND_FAILED: &str = "socket.bind_failed";
    pub const SOCKET_LISTEN_FAILED: &str = "socket.listen_failed";
    pub const SOCKET_ACCEPT_FAILED: &str = "socket.accept_failed";
    pub const SOCKET_CLOSED: &str = "socket.closed";

    pub const STREAM_FULL: &str = "stream.full";
    pub const STREAM_EOF: &str = "stream.eof";
    pub const STREAM_IO: &str = "stream.io";

    pub const TLS_HANDSHAKE_FAILED: &str = "tls.handshake_failed";
    pub const TLS_CREDENTIALS_NOT_READY: &str = "tls.credentials_not_ready";
    pub const TLS_NOT_ESTABLISHED: &str = "tls.not_established";
    pub const TLS_MODE_MISMATCH: &str = "tls.mode_mismatch";

    pub const POOL_NO_UPSTREAM: &str = "reproxy.no_upstream";

    pub const PEER_NOT_FOUND: &str = "peer.not_found";
    pub const PEER_ALREADY_CLOSING: &str = "peer.already_closing";
    pub const TRANSPORT_NOT_ASSOCIATED: &str = "transport.not_associated";
    pub const TRANSPORT_CLOSED: &str = "transport.closed";

    pub const RPC_MALFORMED: &str = "jsonrpc.malformed";
    pub const RPC_PROTOCOL: &str = "jsonrpc.protocol_error";
    pub const RPC_UNKNOWN_ID: &str = "jsonrpc.unknown_id";

    pub const DBUS_INVALID_FRAME: &str = "dbus.invalid_frame";
}

pub type Result<T, E = CoreError> = std::result::Result<T, E>;
