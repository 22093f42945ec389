//! The `Transport` contract, `spec.md` §4.E: the uniform
//! send/receive/close surface every concrete transport (raw TCP
//! framing, a long-poll HTTP bridge, the D-Bus bridge in
//! `eventdance-jsonrpc`) implements, plus the signals it must raise.

use crate::peer::Peer;
use bytes::Bytes;
use eventdance_core::error::CoreError;
use std::sync::Arc;

/// Signals a `Transport` raises, drained by whatever owns the
/// transport (normally the JSON-RPC engine's transport binding) once
/// per reactor turn — the same non-callback, poll-once-per-turn
/// discipline `PeerManager::drain_events` uses, so a transport and the
/// peer manager compose without either needing to hand the other a
/// boxed closure.
#[derive(Clone)]
pub enum TransportEvent {
    Receive(Arc<Peer>),
    NewPeer(Arc<Peer>),
    PeerClosed(Arc<Peer>, bool),
}

/// `spec.md` §4.E "Transport interface". Implementors own the
/// underlying wire connection(s) for zero or more peers and translate
/// between peer-addressed messages and their specific protocol.
pub trait Transport: Send + Sync {
    /// Attempts to deliver `buf` to `peer` immediately. Returns
    /// `Ok(true)` if delivered, `Ok(false)` if the transport could not
    /// deliver right now (the caller should fall back to
    /// `Peer::backlog_push`).
    fn send(&self, peer: &Arc<Peer>, buf: &Bytes) -> Result<bool, CoreError>;

    /// Takes `&Peer` rather than `&Arc<Peer>`: callers (notably
    /// `Peer::is_alive`) only ever have a plain reference, never an
    /// owning handle, when they need to ask this.
    fn peer_is_connected(&self, peer: &Peer) -> bool;

    /// Idempotent per `spec.md` §4.E: implementations should check
    /// `Peer::begin_close` and only run the teardown sequence the first
    /// time it returns `true`.
    fn close_peer(&self, peer: &Arc<Peer>, gracefully: bool) -> Result<(), CoreError>;

    /// Reads the per-peer current message slot (`Peer::receive`).
    fn receive(&self, peer: &Arc<Peer>) -> Option<Bytes> {
        peer.receive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::PeerId;
    use eventdance_core::time::MockClock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct RecordingTransport {
        delivered: Mutex<Vec<Bytes>>,
        close_calls: AtomicUsize,
    }

    impl Transport for RecordingTransport {
        fn send(&self, _peer: &Arc<Peer>, buf: &Bytes) -> Result<bool, CoreError> {
            self.delivered.lock().unwrap().push(buf.clone());
            Ok(true)
        }

        fn peer_is_connected(&self, _peer: &Peer) -> bool {
            true
        }

        fn close_peer(&self, peer: &Arc<Peer>, _gracefully: bool) -> Result<(), CoreError> {
            if peer.begin_close() {
                self.close_calls.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }
    }

    #[test]
    fn close_peer_is_idempotent_through_the_transport() {
        let clock = Arc::new(MockClock::new());
        let peer = Peer::new(PeerId("p1".into()), clock);
        let transport = RecordingTransport {
            delivered: Mutex::new(Vec::new()),
            close_calls: AtomicUsize::new(0),
        };

        transport.close_peer(&peer, true).unwrap();
        transport.close_peer(&peer, true).unwrap();
        assert_eq!(transport.close_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn send_records_delivered_payload() {
        let clock = Arc::new(MockClock::new());
        let peer = Peer::new(PeerId("p1".into()), clock);
        let transport = RecordingTransport {
            delivered: Mutex::new(Vec::new()),
            close_calls: AtomicUsize::new(0),
        };
        assert!(transport.send(&peer, &Bytes::from_static(b"hi")).unwrap());
        assert_eq!(transport.delivered.lock().unwrap().as_slice(), [Bytes::from_static(b"hi")]);
    }
}
