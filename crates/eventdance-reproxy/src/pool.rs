//! The reverse-proxy backend pool, `spec.md` §4.D: a bounded pool of
//! upstream "bridge" connections multiplexed across many client
//! sockets, with idle-timeout learned from observed bridge errors.
//!
//! Generic over `B`, the caller's bridge payload (in EventDance-rs this
//! is an `eventdance_reactor::reactor::SocketId` for the live upstream
//! socket) — the pool itself only tracks lifecycle and timing, never
//! touching the connection.

use eventdance_core::time::SharedClock;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BridgeId(u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ClientId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BridgeState {
    Connecting,
    Free,
    Busy(ClientId),
}

struct BridgeRecord<B> {
    state: BridgeState,
    payload: Option<B>,
    last_activity: Instant,
}

/// Outcome of handing a bridge to a waiting or newly-arriving client.
pub struct Paired<B> {
    pub client: ClientId,
    pub bridge: BridgeId,
    pub payload: B,
}

pub struct BackendPool<B> {
    clock: SharedClock,
    min_pool_size: usize,
    max_pool_size: usize,
    idle_timeout: Duration,
    next_id: u64,
    bridges: HashMap<BridgeId, BridgeRecord<B>>,
    free: VecDeque<BridgeId>,
    nr_connecting: usize,
    awaiting: VecDeque<ClientId>,
}

impl<B> BackendPool<B> {
    pub fn new(config: eventdance_core::config::PoolConfig, clock: SharedClock) -> Self {
        Self {
            clock,
            min_pool_size: config.min_pool_size,
            max_pool_size: config.max_pool_size,
            idle_timeout: config.bridge_idle_timeout,
            next_id: 0,
            bridges: HashMap::new(),
            free: VecDeque::new(),
            nr_connecting: 0,
            awaiting: VecDeque::new(),
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub fn total(&self) -> usize {
        self.bridges.len()
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    pub fn nr_connecting(&self) -> usize {
        self.nr_connecting
    }

    pub fn client_awaiting(&self) -> bool {
        !self.awaiting.is_empty()
    }

    /// Registers a brand-new bridge in the `Connecting` state. Call
    /// before actually issuing the connect so the pool's `total` count
    /// includes it immediately (`spec.md` §4.D lifecycle step 1).
    pub fn begin_connecting(&mut self) -> BridgeId {
        let id = BridgeId(self.next_id);
        self.next_id += 1;
        self.bridges.insert(
            id,
            BridgeRecord {
                state: BridgeState::Connecting,
                payload: None,
                last_activity: self.clock.now(),
            },
        );
        self.nr_connecting += 1;
        id
    }

    /// Whether another bridge should be started right now, per `spec.md`
    /// §4.D "Lifecycle per bridge" step 1 / "Proactive growth": either a
    /// client is waiting, or the free pool is below its floor, and the
    /// pool isn't already at capacity.
    pub fn should_grow(&self) -> bool {
        self.total() < self.max_pool_size && (self.client_awaiting() || self.free_count() < self.min_pool_size)
    }

    /// A client arrives looking for a bridge. Returns an already-free
    /// bridge immediately (oldest first, for fairness), or `None` if
    /// the client must wait — in which case the caller should enqueue
    /// the client and, per `should_grow`, possibly start a new bridge.
    pub fn request_bridge(&mut self, client: ClientId) -> Option<(BridgeId, B)> {
        if let Some(id) = self.free.pop_front() {
            let record = self.bridges.get_mut(&id).expect("free queue references live bridge");
            record.state = BridgeState::Busy(client);
            record.last_activity = self.clock.now();
            let payload = record.payload.take().expect("free bridge carries a payload");
            Some((id, payload))
        } else {
            self.awaiting.push_back(client);
            None
        }
    }

    /// A bridge finished connecting. Pairs it with the oldest awaiting
    /// client if one exists (per `spec.md` §4.D's "push to tail, pop
    /// oldest" fairness rule), otherwise parks it in the free queue.
    pub fn on_bridge_connected(&mut self, id: BridgeId, payload: B) -> Result<Option<Paired<B>>, B> {
        let Some(record) = self.bridges.get_mut(&id) else {
            return Err(payload);
        };
        if record.state != BridgeState::Connecting {
            return Err(payload);
        }
        self.nr_connecting = self.nr_connecting.saturating_sub(1);
        record.payload = Some(payload);
        record.state = BridgeState::Free;
        record.last_activity = self.clock.now();
        self.free.push_back(id);

        if let Some(client) = self.awaiting.pop_front() {
            let paired_id = self.free.pop_front().expect("just pushed a free bridge");
            let record = self.bridges.get_mut(&paired_id).expect("paired bridge is live");
            record.state = BridgeState::Busy(client);
            record.last_activity = self.clock.now();
            let payload = record.payload.take().expect("paired bridge carries a payload");
            Ok(Some(Paired {
                client,
                bridge: paired_id,
                payload,
            }))
        } else {
            Ok(None)
        }
    }

    /// Records activity on a live bridge, relaxing `idle_timeout` up to
    /// the observed inactivity window (`spec.md` §4.D: "set idle_timeout
    /// = max(idle_timeout, inactivity_at_observation)").
    pub fn on_bridge_activity(&mut self, id: BridgeId) {
        let now = self.clock.now();
        if let Some(record) = self.bridges.get_mut(&id) {
            let inactivity = now.saturating_duration_since(record.last_activity);
            self.idle_timeout = self.idle_timeout.max(inactivity);
            record.last_activity = now;
        }
    }

    /// A bridge reported an error. Tightens `idle_timeout` to the
    /// errored bridge's own inactivity interval, then sweeps the free
    /// queue for bridges that have been idle longer than the new
    /// timeout, returning their ids for the caller to actually close.
    pub fn on_bridge_error(&mut self, id: BridgeId) -> Vec<BridgeId> {
        let now = self.clock.now();
        if let Some(record) = self.bridges.get(&id) {
            let interval = now.saturating_duration_since(record.last_activity);
            self.idle_timeout = self.idle_timeout.min(interval);
        }

        let timeout = self.idle_timeout;
        let stale: Vec<BridgeId> = self
            .free
            .iter()
            .copied()
            .filter(|candidate| {
                self.bridges
                    .get(candidate)
                    .is_some_and(|record| now.saturating_duration_since(record.last_activity) > timeout)
            })
            .collect();

        for stale_id in &stale {
            self.free.retain(|candidate| candidate != stale_id);
            self.bridges.remove(stale_id);
        }
        stale
    }

    /// A bridge (free or busy) closed. Per `spec.md` §4.D lifecycle step
    /// 4: if a client is awaiting or the pool is below its floor,
    /// reconnect the same bridge (caller reuses the socket object and
    /// re-issues connect, transitioning it back through
    /// `begin_connecting`); otherwise the bridge is destroyed and
    /// forgotten.
    pub fn on_bridge_closed(&mut self, id: BridgeId) -> BridgeDisposition {
        self.bridges.remove(&id);
        self.free.retain(|candidate| *candidate != id);
        if self.client_awaiting() || self.total() < self.min_pool_size {
            BridgeDisposition::Reuse
        } else {
            BridgeDisposition::Destroy
        }
    }

    /// `spec.md` §4.D "Doubtful bridge": a free bridge idle longer than
    /// `idle_timeout` is advisory-tagged; the dispatcher MAY prefer
    /// fresher bridges when choosing among several free ones.
    pub fn is_doubtful(&self, id: BridgeId) -> bool {
        let now = self.clock.now();
        self.bridges
            .get(&id)
            .is_some_and(|record| now.saturating_duration_since(record.last_activity) > self.idle_timeout)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BridgeDisposition {
    Reuse,
    Destroy,
}


#[cfg(test)]
mod properties {
    use super::*;
    use eventdance_core::config::PoolConfig;
    use eventdance_core::time::MockClock;
    use proptest::prelude::*;
    use std::sync::Arc;

    proptest! {
        /// `spec.md` §8's pool invariant: `total <= max` at every point,
        /// across any interleaving of bridges starting to connect,
        /// finishing connecting, clients arriving, and bridges closing —
        /// since `begin_connecting` is only ever called when
        /// `should_grow()` reports room, this should hold no matter the
        /// order of operations.
        #[test]
        fn total_never_exceeds_max_under_random_operations(
            ops in proptest::collection::vec((0u8..4, any::<u8>()), 1..200),
            min in 0usize..3,
            extra in 0usize..5,
        ) {
            let max = min + extra;
            let clock = Arc::new(MockClock::new());
            let mut pool: BackendPool<&'static str> = BackendPool::new(
                PoolConfig { min_pool_size: min, max_pool_size: max, bridge_idle_timeout: Duration::from_secs(60) },
                clock,
            );
            let mut created: Vec<BridgeId> = Vec::new();
            let mut connecting: Vec<BridgeId> = Vec::new();
            let mut next_client = 0u64;

            for (action, pick) in ops {
                match action {
                    0 => {
                        if pool.should_grow() {
                            let id = pool.begin_connecting();
                            created.push(id);
                            connecting.push(id);
                        }
                    }
                    1 => {
                        if !connecting.is_empty() {
                            let idx = (pick as usize) % connecting.len();
                            let id = connecting.remove(idx);
                            let _ = pool.on_bridge_connected(id, "bridge");
                        }
                    }
                    2 => {
                        next_client += 1;
                        let _ = pool.request_bridge(ClientId(next_client));
                    }
                    _ => {
                        if !created.is_empty() {
                            let idx = (pick as usize) % created.len();
                            let id = created.remove(idx);
                            connecting.retain(|candidate| candidate != &id);
                            pool.on_bridge_closed(id);
                        }
                    }
                }
                prop_assert!(pool.total() <= max);
            }
        }
    }
}
