//! Typed configuration for every knob named in `spec.md` §6.
//!
//! Each struct documents its default inline rather than scattering magic
//! numbers through the implementation, and every default below is the
//! one `spec.md` states explicitly (or, where `spec.md` is silent, the
//! one the original C implementation used — see `DESIGN.md`).

use std::time::Duration;

/// Event dispatch priority. Listening sockets run one step above
/// `Default`, connecting sockets two steps above, and an established
/// connection returns to whatever the caller configured — see
/// `spec.md` §4.A "Priorities".
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    High,
    AboveDefault,
    Default,
    BelowDefault,
    Low,
}

impl Priority {
    pub fn step_up(self, steps: u8) -> Priority {
        let rank = match self {
            Priority::Low => 0,
            Priority::BelowDefault => 1,
            Priority::Default => 2,
            Priority::AboveDefault => 3,
            Priority::High => 4,
        };
        let bumped = (rank + steps).min(4);
        match bumped {
            0 => Priority::Low,
            1 => Priority::BelowDefault,
            2 => Priority::Default,
            3 => Priority::AboveDefault,
            _ => Priority::High,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Default
    }
}

/// Per-socket configuration honored uniformly whether the socket is a
/// listener, an accepted child, or an outbound connection.
#[derive(Clone, Debug)]
pub struct SocketConfig {
    pub priority: Priority,
    /// 0 means "no connect timeout".
    pub connect_timeout: Duration,
    pub tls_autostart: bool,
    pub require_peer_cert: bool,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            priority: Priority::Default,
            connect_timeout: Duration::ZERO,
            tls_autostart: false,
            require_peer_cert: false,
        }
    }
}

/// Throttle configuration: bandwidth in bytes/second (0 = unlimited) and
/// minimum inter-op latency in microseconds (0 = none), per direction.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThrottleConfig {
    pub bandwidth_in: u64,
    pub bandwidth_out: u64,
    pub latency_in_micros: u64,
    pub latency_out_micros: u64,
}

impl ThrottleConfig {
    /// Builds a config from the wire units named in `spec.md` §6:
    /// bandwidth in kB/s (floating) and latency in milliseconds
    /// (floating).
    pub fn from_kbps_ms(bandwidth_kbps: f64, latency_ms: f64) -> (u64, u64) {
        let bytes_per_sec = (bandwidth_kbps * 1000.0).max(0.0) as u64;
        let micros = (latency_ms * 1000.0).max(0.0) as u64;
        (bytes_per_sec, micros)
    }
}

/// Reproxy backend pool configuration — `spec.md` §3/§4.D/§6.
#[derive(Clone, Copy, Debug)]
pub struct PoolConfig {
    pub min_pool_size: usize,
    pub max_pool_size: usize,
    pub bridge_idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_pool_size: 1,
            max_pool_size: 5,
            bridge_idle_timeout: Duration::from_secs(60),
        }
    }
}

/// Peer manager configuration — `spec.md` §3/§4.E/§6.
///
/// The 600s default for `peer_timeout` matches the original C
/// implementation (`evd-peer-manager.c`); `spec.md`'s §8 scenario uses
/// 30s, but that is a test fixture value, not a changed default — see
/// `DESIGN.md`.
#[derive(Clone, Copy, Debug)]
pub struct PeerManagerConfig {
    pub cleanup_interval: Duration,
    pub peer_timeout: Duration,
}

impl Default for PeerManagerConfig {
    fn default() -> Self {
        Self {
            cleanup_interval: Duration::from_secs(10),
            peer_timeout: Duration::from_secs(600),
        }
    }
}

/// Listen backlog default from `spec.md` §6.
pub const DEFAULT_LISTEN_BACKLOG: i32 = 10_000;

/// Default TLS cipher priority string from `spec.md` §6.
pub const DEFAULT_TLS_PRIORITY: &str = "NORMAL";
