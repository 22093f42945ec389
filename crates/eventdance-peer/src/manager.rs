//! `PeerManager`, `spec.md` §4.E: owns the `id → Peer` map, runs the
//! lazy liveness sweep, and emits `new-peer`/`peer-closed` events.
//!
//! Grounded on `evd-peer-manager.c`'s `g_hash_table` of peers plus a
//! periodic sweep timer — here the timer is driven by the caller (the
//! reactor loop) calling `maybe_sweep` rather than a GLib source, since
//! `spec.md` §5 keeps all scheduling on the single reactor thread.

use crate::peer::{Peer, PeerId};
use eventdance_core::config::PeerManagerConfig;
use eventdance_core::time::SharedClock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Events a `PeerManager` raises. The caller (normally a `Transport`
/// implementation wiring peers to JSON-RPC) is expected to poll
/// `drain_events` once per reactor turn rather than receive a callback,
/// keeping this crate free of a signal/bus dependency.
#[derive(Clone, Debug)]
pub enum PeerEvent {
    NewPeer(PeerId),
    PeerClosed(PeerId),
}

pub struct PeerManager {
    clock: SharedClock,
    config: PeerManagerConfig,
    peers: HashMap<PeerId, Arc<Peer>>,
    events: Vec<PeerEvent>,
    last_sweep: Instant,
}

impl PeerManager {
    pub fn new(config: PeerManagerConfig, clock: SharedClock) -> Self {
        let last_sweep = clock.now();
        Self {
            clock,
            config,
            peers: HashMap::new(),
            events: Vec::new(),
            last_sweep,
        }
    }

    /// Inserts a newly-created peer and emits `new-peer`.
    pub fn insert(&mut self, peer: Arc<Peer>) {
        let id = peer.id().clone();
        self.peers.insert(id.clone(), peer);
        self.events.push(PeerEvent::NewPeer(id));
    }

    /// Looks up a peer, purging it first if it is no longer alive —
    /// `spec.md` §4.E: "`lookup(id)` additionally purges a dead entry
    /// on sight".
    pub fn lookup(&mut self, id: &PeerId) -> Option<Arc<Peer>> {
        if let Some(peer) = self.peers.get(id) {
            if !peer.is_alive(self.config.peer_timeout) {
                self.peers.remove(id);
                self.events.push(PeerEvent::PeerClosed(id.clone()));
                return None;
            }
        }
        self.peers.get(id).cloned()
    }

    /// All currently-registered peers, after first running a sweep if
    /// one is due. `spec.md` §4.E: `get_all_peers` is one of the two
    /// operations (alongside `lookup`) that may trigger a lazy sweep.
    pub fn get_all_peers(&mut self) -> Vec<Arc<Peer>> {
        self.maybe_sweep();
        self.peers.values().cloned().collect()
    }

    /// Runs the liveness sweep if `cleanup_interval` has elapsed since
    /// the last one. Safe to call every reactor turn; it is a no-op
    /// between intervals.
    pub fn maybe_sweep(&mut self) {
        let now = self.clock.now();
        if now.saturating_duration_since(self.last_sweep) < self.config.cleanup_interval {
            return;
        }
        self.last_sweep = now;
        self.sweep();
    }

    fn sweep(&mut self) {
        let dead: Vec<PeerId> = self
            .peers
            .iter()
            .filter(|(_, peer)| !peer.is_alive(self.config.peer_timeout))
            .map(|(id, _)| id.clone())
            .collect();
        for id in dead {
            self.peers.remove(&id);
            self.events.push(PeerEvent::PeerClosed(id));
        }
    }

    /// Drains accumulated `new-peer`/`peer-closed` events in emission
    /// order. Call once per reactor turn after `maybe_sweep`/`lookup`.
    pub fn drain_events(&mut self) -> Vec<PeerEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventdance_core::time::MockClock;
    use std::time::Duration;

    fn manager_with(cleanup: Duration, timeout: Duration) -> (PeerManager, Arc<MockClock>) {
        let clock = Arc::new(MockClock::new());
        let manager = PeerManager::new(
            PeerManagerConfig {
                cleanup_interval: cleanup,
                peer_timeout: timeout,
            },
            clock.clone(),
        );
        (manager, clock)
    }

    #[test]
    fn insert_emits_new_peer_event() {
        let (mut manager, clock) = manager_with(Duration::from_secs(10), Duration::from_secs(30));
        let peer = Peer::new(PeerId("p1".into()), clock);
        manager.insert(peer);
        let events = manager.drain_events();
        assert!(matches!(events.as_slice(), [PeerEvent::NewPeer(id)] if id.0 == "p1"));
    }

    #[test]
    fn sweep_after_40s_removes_peer_idle_past_30s_timeout() {
        let (mut manager, clock) = manager_with(Duration::from_secs(10), Duration::from_secs(30));
        let peer = Peer::new(PeerId("p1".into()), clock.clone());
        manager.insert(peer);
        manager.drain_events();

        clock.advance(Duration::from_secs(40));
        let all = manager.get_all_peers();
        assert!(all.is_empty());
        let events = manager.drain_events();
        assert!(matches!(events.as_slice(), [PeerEvent::PeerClosed(id)] if id.0 == "p1"));
    }

    #[test]
    fn lookup_purges_dead_peer_on_sight() {
        let (mut manager, clock) = manager_with(Duration::from_secs(10), Duration::from_secs(30));
        let id = PeerId("p1".into());
        manager.insert(Peer::new(id.clone(), clock.clone()));
        manager.drain_events();

        clock.advance(Duration::from_secs(40));
        assert!(manager.lookup(&id).is_none());
        assert!(matches!(manager.drain_events().as_slice(), [PeerEvent::PeerClosed(_)]));
    }
}
