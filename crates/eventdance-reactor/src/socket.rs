//! The socket state machine from `spec.md` §3/§4.A.
//!
//! ```text
//! Closed ──bind──▶ Bound ──listen──▶ Listening
//!   │                                   │accept
//!   │                                   ▼
//!   │                               Connected ─┐
//!   ├──connect──▶ Resolving ─addr──▶ Connecting│
//!   │                                   │OUT-ready
//!   │                                   ▼
//!   │                               Connected
//!   │                                   │starttls
//!   │                                   ▼
//!   │                            TlsHandshaking ─handshake-ok──▶ Connected
//!   │
//!   └──any state──▶ Closing ──streams-drained──▶ Closed
//! ```
//!
//! `SocketState::can_transition_to` is the single source of truth for
//! which edges are legal, the same discipline the teacher codebase uses
//! for its call-leg state machine: a table consulted by the transition
//! function rather than `if`-chains duplicated at every call site.

use eventdance_core::condition::Condition;
use eventdance_core::config::{Priority, SocketConfig};
use eventdance_core::error::{codes, CoreError, ErrorCategory};
use std::net::SocketAddr;
use std::time::Instant;

/// What a socket was doing before it entered `Resolving`, so that once
/// the address resolves the socket knows whether to continue into
/// `Connecting` or simply report the resolved address and go back to
/// `Closed`. `spec.md` §3 calls this the "prior-state snapshot for
/// sub-action under Resolving"; `original_source/evd-socket.c` keeps it
/// as a literal `sub_status` field alongside `status`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PendingAction {
    Connect,
    ResolveOnly,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum SocketState {
    Closed,
    Resolving,
    Bound,
    Listening,
    Connecting,
    Connected,
    TlsHandshaking,
    Closing,
}

impl SocketState {
    /// Whether `self -> target` is a legal edge in the diagram above.
    /// `Closing` and `Closed` are reachable from anywhere (a socket can
    /// always be asked to close), which is why they're handled before
    /// the exhaustive per-state match.
    pub fn can_transition_to(self, target: SocketState) -> bool {
        use SocketState::*;
        if matches!(target, Closing) {
            return self != Closing && self != Closed;
        }
        if matches!(target, Closed) {
            return true;
        }
        matches!(
            (self, target),
            (Closed, Resolving)
                | (Closed, Bound)
                | (Resolving, Connecting)
                | (Resolving, Bound)
                | (Bound, Listening)
                | (Bound, Connecting)
                | (Listening, Connected)
                | (Connecting, Connected)
                | (Connected, TlsHandshaking)
                | (TlsHandshaking, Connected)
        )
    }
}

/// A deferred-close mode: a socket that received `hangup` while its
/// buffered input still had unread bytes keeps the read path alive
/// until the application drains the buffer, per `spec.md` §4.A's
/// tie-break rule. Plain `Closing` sockets have no such condition.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CloseMode {
    #[default]
    Immediate,
    AwaitingDrain,
}

/// The non-blocking socket described in `spec.md` §3.
///
/// `Socket` owns the raw OS handle (via `mio`/`socket2`) and the state
/// machine above; it does not own the layered stream stack directly —
/// that is built lazily by `Connection` once the socket reaches
/// `Connected`, matching the invariant "`Connected` implies streams
/// exist" without forcing every `Closed`/`Resolving` socket to carry
/// unused stream state.
pub struct Socket {
    pub(crate) mio_socket: Option<socket2::Socket>,
    state: SocketState,
    pending_action: Option<PendingAction>,
    watched_mask: Condition,
    last_observed: Condition,
    config: SocketConfig,
    priority: Priority,
    connect_deadline: Option<Instant>,
    close_mode: CloseMode,
    local_addr: Option<SocketAddr>,
    peer_addr: Option<SocketAddr>,
}

impl Socket {
    pub fn new(config: SocketConfig) -> Self {
        let priority = config.priority;
        Self {
            mio_socket: None,
            state: SocketState::Closed,
            pending_action: None,
            watched_mask: Condition::empty(),
            last_observed: Condition::empty(),
            config,
            priority,
            connect_deadline: None,
            close_mode: CloseMode::Immediate,
            local_addr: None,
            peer_addr: None,
        }
    }

    pub fn state(&self) -> SocketState {
        self.state
    }

    pub fn watched_mask(&self) -> Condition {
        self.watched_mask
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn config(&self) -> &SocketConfig {
        &self.config
    }

    /// Requests a new watch mask; enforces the §8 invariant that it is
    /// always a subset of `{readable, writable}` before arming it.
    pub fn set_watched_mask(&mut self, mask: Condition) -> Result<(), CoreError> {
        if !mask.is_valid_watch_mask() {
            return Err(CoreError::programmer(
                codes::SOCKET_INVALID_TRANSITION,
                "watched mask must be a subset of {readable, writable}",
            ));
        }
        self.watched_mask = mask;
        Ok(())
    }

    pub fn last_observed(&self) -> Condition {
        self.last_observed
    }

    pub fn record_observed(&mut self, condition: Condition) {
        self.last_observed |= condition;
    }

    pub fn clear_observed(&mut self) {
        self.last_observed = Condition::empty();
    }

    /// Drives one state transition. Returns a `Programmer`-category
    /// error if the edge is illegal — this is the only place the state
    /// field is ever written, so every caller funnels through the same
    /// validation the diagram describes.
    pub fn transition(&mut self, target: SocketState) -> Result<(), CoreError> {
        if !self.state.can_transition_to(target) {
            return Err(CoreError::programmer(
                codes::SOCKET_INVALID_TRANSITION,
                format!("illegal socket transition {:?} -> {:?}", self.state, target),
            ));
        }
        self.state = target;
        Ok(())
    }

    pub fn set_pending_action(&mut self, action: Option<PendingAction>) {
        self.pending_action = action;
    }

    pub fn pending_action(&self) -> Option<PendingAction> {
        self.pending_action
    }

    pub fn set_addrs(&mut self, local: Option<SocketAddr>, peer: Option<SocketAddr>) {
        self.local_addr = local;
        self.peer_addr = peer;
    }

    pub fn arm_connect_timeout(&mut self, at: Instant) {
        self.connect_deadline = Some(at);
    }

    pub fn connect_deadline(&self) -> Option<Instant> {
        self.connect_deadline
    }

    pub fn clear_connect_timeout(&mut self) {
        self.connect_deadline = None;
    }

    pub fn close_mode(&self) -> CloseMode {
        self.close_mode
    }

    pub fn set_close_mode(&mut self, mode: CloseMode) {
        self.close_mode = mode;
    }

    /// Raises the socket's dispatch priority per `spec.md` §4.A:
    /// listening sockets get `+1`, connecting sockets get `+2`; once
    /// `Connected` the priority returns to the configured default.
    pub fn recompute_dispatch_priority(&mut self) {
        self.priority = match self.state {
            SocketState::Listening => self.config.priority.step_up(1),
            SocketState::Connecting => self.config.priority.step_up(2),
            _ => self.config.priority,
        };
    }

    /// Classifies an `error` condition surfaced while in the given
    /// state, per `spec.md` §4.A "Errors": refused while connecting,
    /// otherwise unknown.
    pub fn classify_error(state: SocketState, cause: std::io::Error) -> CoreError {
        let (code, category) = match state {
            SocketState::Connecting => (codes::SOCKET_CONNECT_REFUSED, ErrorCategory::Resource),
            _ => (codes::SOCKET_UNKNOWN_ERROR, ErrorCategory::Resource),
        };
        CoreError::new(code, cause.to_string())
            .with_category(category)
            .with_cause(cause)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_edges_are_accepted() {
        assert!(SocketState::Closed.can_transition_to(SocketState::Bound));
        assert!(SocketState::Bound.can_transition_to(SocketState::Listening));
        assert!(SocketState::Listening.can_transition_to(SocketState::Connected));
        assert!(SocketState::Connecting.can_transition_to(SocketState::Connected));
        assert!(SocketState::Connected.can_transition_to(SocketState::TlsHandshaking));
        assert!(SocketState::TlsHandshaking.can_transition_to(SocketState::Connected));
    }

    #[test]
    fn illegal_edges_are_rejected() {
        assert!(!SocketState::Closed.can_transition_to(SocketState::Connected));
        assert!(!SocketState::Bound.can_transition_to(SocketState::TlsHandshaking));
    }

    #[test]
    fn any_state_can_close_except_already_closing_or_closed() {
        assert!(SocketState::Connected.can_transition_to(SocketState::Closing));
        assert!(SocketState::Resolving.can_transition_to(SocketState::Closing));
        assert!(!SocketState::Closing.can_transition_to(SocketState::Closing));
        assert!(!SocketState::Closed.can_transition_to(SocketState::Closing));
    }

    #[test]
    fn closing_to_closed_twice_succeeds_both_times() {
        let mut socket = Socket::new(SocketConfig::default());
        socket.transition(SocketState::Closing).unwrap();
        socket.transition(SocketState::Closed).unwrap();
        assert_eq!(socket.state(), SocketState::Closed);
        socket.transition(SocketState::Closed).unwrap();
        assert_eq!(socket.state(), SocketState::Closed);
    }

    #[test]
    fn socket_rejects_watch_mask_with_hangup_bit() {
        let mut socket = Socket::new(SocketConfig::default());
        let err = socket
            .set_watched_mask(Condition::HANGUP)
            .expect_err("hangup is not watchable");
        assert_eq!(err.category(), ErrorCategory::Programmer);
    }

    #[test]
    fn priority_steps_up_while_connecting_and_listening() {
        let mut socket = Socket::new(SocketConfig::default());
        socket.transition(SocketState::Bound).unwrap();
        socket.transition(SocketState::Listening).unwrap();
        socket.recompute_dispatch_priority();
        assert_eq!(socket.priority(), Priority::Default.step_up(1));
    }
}
