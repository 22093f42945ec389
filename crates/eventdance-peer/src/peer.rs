//! `Peer`, `spec.md` §4.E: the stable per-client identity sitting above
//! a pluggable `Transport`. Grounded on `evd-peer-manager.c`'s UUID peer
//! ids and backlog-then-drain-on-attach pattern — here the backlog is a
//! `VecDeque<Bytes>` rather than a GLib queue.

use crate::transport::Transport;
use bytes::Bytes;
use eventdance_core::time::SharedClock;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PeerId(pub String);

impl PeerId {
    /// A process-random 128-bit id, hex-encoded — the same role as
    /// `evd_uuid_new()` in the original, without pulling in a UUID
    /// crate for a format nothing here parses back.
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
        PeerId(hex)
    }
}

struct PeerState {
    backlog: VecDeque<Bytes>,
    current_message: Option<Bytes>,
    last_activity: Instant,
}

/// A connected client's identity. `Peer` does not itself implement
/// transport-specific framing or I/O — it is the stable handle a
/// `Transport` implementation and a `PeerManager` both hold, so a
/// reconnecting client (e.g. a new long-poll request) can be
/// re-attached to the same backlog and liveness state.
pub struct Peer {
    id: PeerId,
    clock: SharedClock,
    closing: AtomicBool,
    transport: Mutex<Option<Weak<dyn Transport>>>,
    state: Mutex<PeerState>,
}

impl Peer {
    pub fn new(id: PeerId, clock: SharedClock) -> Arc<Self> {
        let now = clock.now();
        Arc::new(Self {
            id,
            clock,
            closing: AtomicBool::new(false),
            transport: Mutex::new(None),
            state: Mutex::new(PeerState {
                backlog: VecDeque::new(),
                current_message: None,
                last_activity: now,
            }),
        })
    }

    pub fn id(&self) -> &PeerId {
        &self.id
    }

    /// Records the transport this peer is reachable through, weakly —
    /// `spec.md` §3's ownership summary: "peers weak-reference their
    /// transport". Consulted by `is_alive` so a peer whose transport
    /// still reports it connected is never reaped purely for having
    /// been idle past `peer_timeout`.
    pub fn set_transport(&self, transport: Weak<dyn Transport>) {
        *self.transport.lock().expect("peer transport mutex poisoned") = Some(transport);
    }

    pub fn touch(&self) {
        let mut state = self.state.lock().expect("peer state mutex poisoned");
        state.last_activity = self.clock.now();
    }

    pub fn last_activity(&self) -> Instant {
        self.state.lock().expect("peer state mutex poisoned").last_activity
    }

    /// `spec.md` §3: "a peer is alive iff either its transport reports
    /// it connected OR time-since-last-activity < peer-timeout".
    pub fn is_alive(&self, peer_timeout: Duration) -> bool {
        if self.closing.load(Ordering::SeqCst) {
            return false;
        }
        let transport_connected = self
            .transport
            .lock()
            .expect("peer transport mutex poisoned")
            .as_ref()
            .and_then(Weak::upgrade)
            .is_some_and(|transport| transport.peer_is_connected(self));
        if transport_connected {
            return true;
        }
        let elapsed = self.clock.now().saturating_duration_since(self.last_activity());
        elapsed <= peer_timeout
    }

    /// Begins the close sequence. Returns `true` the first time it is
    /// called (the caller should run the actual teardown); subsequent
    /// calls are no-ops, per `spec.md` §4.E's idempotent `close_peer`
    /// contract.
    pub fn begin_close(&self) -> bool {
        self.closing.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_ok()
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    /// Sets the current synchronously-delivered inbound buffer for the
    /// duration of a `receive` signal. `spec.md` §4.E "Inbound dispatch
    /// contract": valid only until the signal handler returns.
    pub fn set_current_message(&self, message: Option<Bytes>) {
        self.state.lock().expect("peer state mutex poisoned").current_message = message;
        self.touch();
    }

    pub fn receive(&self) -> Option<Bytes> {
        self.state.lock().expect("peer state mutex poisoned").current_message.clone()
    }

    pub fn backlog_push(&self, frame: Bytes) {
        self.state.lock().expect("peer state mutex poisoned").backlog.push_back(frame);
    }

    pub fn backlog_pop(&self) -> Option<Bytes> {
        self.state.lock().expect("peer state mutex poisoned").backlog.pop_front()
    }

    pub fn backlog_is_empty(&self) -> bool {
        self.state.lock().expect("peer state mutex poisoned").backlog.is_empty()
    }
}


#[cfg(test)]
mod properties {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    proptest! {
        /// `spec.md` §8's peer-id invariant: "for all peers P in the
        /// manager, P.id is unique". `PeerId::generate` draws from 128
        /// bits of OS randomness, so a batch of freshly generated ids
        /// should never collide within the batch sizes this crate ever
        /// produces in practice.
        #[test]
        fn generated_ids_never_collide_within_a_batch(count in 2usize..500) {
            let ids: HashSet<String> = (0..count).map(|_| PeerId::generate().0).collect();
            prop_assert_eq!(ids.len(), count);
        }
    }
}
