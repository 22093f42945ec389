//! The edge-triggered readiness reactor, `spec.md` §4.A component A.
//!
//! A single-threaded `mio::Poll` loop. Each registered socket owns a
//! `Token` (an index into `slab::Slab`); on every `turn` the reactor
//! drains `mio::Events` into a per-turn readiness mailbox, sorts it by
//! the socket's current dispatch `Priority` (highest first — listening
//! and connecting sockets step up automatically, see
//! `Socket::recompute_dispatch_priority`), then dispatches each
//! condition to the caller-supplied [`ReactorHandler`].
//!
//! Edge-triggered semantics put two policies on the reactor rather than
//! the caller: a socket is only ever watched for bits it asked for
//! (`spec.md` §8's subset invariant, enforced in `Socket::set_watched_mask`),
//! and within one dispatch a completed connect (write-ready while
//! `Connecting`) is resolved before any read bit on the same socket is
//! handled, so a caller never observes "readable" on a socket that
//! hasn't finished connecting yet. The read bit is never discarded: a
//! coincident readable edge on a connecting socket is redelivered in a
//! second `on_ready` call the moment the connect resolves, so data
//! already sitting in the kernel buffer isn't stranded waiting on an
//! edge that, with edge-triggered readiness, may never come again.

use crate::slab::Slab;
use crate::socket::{Socket, SocketState};
use eventdance_core::condition::Condition;
use eventdance_core::error::{codes, CoreError};
use mio::event::Source;
use mio::net::{TcpListener, TcpStream, UnixListener, UnixStream};
use mio::{Events, Interest, Poll, Token};
use std::time::{Duration, Instant};

/// A handle identifying a socket registered with the reactor. Stable for
/// the socket's lifetime; reused (via the slab's free list) only after
/// the socket has been deregistered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SocketId(usize);

impl SocketId {
    fn token(self) -> Token {
        Token(self.0)
    }

    fn from_token(token: Token) -> Self {
        SocketId(token.0)
    }
}

/// The concrete OS-backed source a [`Socket`] is multiplexed over. Kept
/// separate from `Socket`'s own state so `Socket` stays usable in unit
/// tests (see `socket.rs`) without a live file descriptor.
pub enum SocketSource {
    Tcp(TcpStream),
    TcpListener(TcpListener),
    Unix(UnixStream),
    UnixListener(UnixListener),
}

impl SocketSource {
    fn source_mut(&mut self) -> &mut dyn Source {
        match self {
            SocketSource::Tcp(s) => s,
            SocketSource::TcpListener(s) => s,
            SocketSource::Unix(s) => s,
            SocketSource::UnixListener(s) => s,
        }
    }
}

struct SocketEntry {
    socket: Socket,
    source: SocketSource,
}

fn interest_for(mask: Condition) -> Option<Interest> {
    let readable = mask.contains(Condition::READABLE);
    let writable = mask.contains(Condition::WRITABLE);
    match (readable, writable) {
        (true, true) => Some(Interest::READABLE | Interest::WRITABLE),
        (true, false) => Some(Interest::READABLE),
        (false, true) => Some(Interest::WRITABLE),
        (false, false) => None,
    }
}

/// The caller-supplied per-socket event handler, `spec.md` §4.A
/// "wakes per-socket event handlers with a condition mask".
pub trait ReactorHandler {
    /// Delivered with the conditions observed this turn for `id`,
    /// already tie-broken (a completed connect is reported before any
    /// read bit on the same socket). Ordinarily called once per socket
    /// per turn; a socket that is `Connecting` and sees both a write-
    /// ready and a read-ready edge in the same turn is instead dispatched
    /// twice — once to resolve the connect, then again with
    /// `Condition::READABLE` once the socket has left `Connecting` — so
    /// the coincident read edge is never silently dropped.
    fn on_ready(&mut self, id: SocketId, socket: &mut Socket, condition: Condition) -> Result<(), CoreError>;

    /// Delivered when a `Connecting` socket's `connect_deadline` has
    /// passed without a write-ready edge.
    fn on_connect_timeout(&mut self, id: SocketId, socket: &mut Socket);
}

pub struct Reactor {
    poll: Poll,
    events: Events,
    sockets: Slab<SocketEntry>,
}

impl Reactor {
    pub fn new(event_capacity: usize) -> Result<Self, CoreError> {
        let poll = Poll::new().map_err(|err| CoreError::from_io(codes::SOCKET_BIND_FAILED, err))?;
        Ok(Self {
            poll,
            events: Events::with_capacity(event_capacity.max(1)),
            sockets: Slab::new(),
        })
    }

    /// Registers a socket with the reactor, arming interest for its
    /// current `watched_mask` (possibly none, if the caller hasn't
    /// armed a watch yet).
    pub fn register(&mut self, socket: Socket, mut source: SocketSource) -> Result<SocketId, CoreError> {
        let mask = socket.watched_mask();
        let entry = SocketEntry { socket, source };
        let index = self.sockets.insert(entry);
        let id = SocketId(index);
        if let Some(interest) = interest_for(mask) {
            let entry = self.sockets.get_mut(index).expect("just inserted");
            self.poll
                .registry()
                .register(entry.source.source_mut(), id.token(), interest)
                .map_err(|err| CoreError::from_io(codes::SOCKET_BIND_FAILED, err))?;
        }
        Ok(id)
    }

    /// Re-applies a socket's `watched_mask` to its OS registration.
    /// Must be called any time `Socket::set_watched_mask` changes the
    /// mask for a socket already registered with this reactor.
    pub fn reregister(&mut self, id: SocketId) -> Result<(), CoreError> {
        let entry = self
            .sockets
            .get_mut(id.0)
            .ok_or_else(|| CoreError::programmer(codes::SOCKET_INVALID_TRANSITION, "unknown socket id"))?;
        let mask = entry.socket.watched_mask();
        match interest_for(mask) {
            Some(interest) => self
                .poll
                .registry()
                .reregister(entry.source.source_mut(), id.token(), interest)
                .or_else(|_| {
                    self.poll
                        .registry()
                        .register(entry.source.source_mut(), id.token(), interest)
                })
                .map_err(|err| CoreError::from_io(codes::SOCKET_BIND_FAILED, err)),
            None => self
                .poll
                .registry()
                .deregister(entry.source.source_mut())
                .or(Ok(())),
        }
    }

    pub fn deregister(&mut self, id: SocketId) -> Option<Socket> {
        let mut entry = self.sockets.remove(id.0)?;
        let _ = self.poll.registry().deregister(entry.source.source_mut());
        Some(entry.socket)
    }

    pub fn socket(&self, id: SocketId) -> Option<&Socket> {
        self.sockets.get(id.0).map(|e| &e.socket)
    }

    pub fn socket_mut(&mut self, id: SocketId) -> Option<&mut Socket> {
        self.sockets.get_mut(id.0).map(|e| &mut e.socket)
    }

    /// Runs one iteration of the loop: polls for readiness (blocking up
    /// to `timeout`), sweeps expired connect timeouts, then dispatches
    /// every observed condition in priority order, highest first.
    pub fn turn(&mut self, timeout: Option<Duration>, handler: &mut dyn ReactorHandler, now: Instant) -> Result<(), CoreError> {
        self.poll
            .poll(&mut self.events, timeout)
            .map_err(|err| CoreError::from_io(codes::SOCKET_UNKNOWN_ERROR, err))?;

        let mut mailbox: Vec<(SocketId, Condition)> = Vec::new();
        for event in self.events.iter() {
            let id = SocketId::from_token(event.token());
            let mut condition = Condition::empty();
            if event.is_readable() {
                condition |= Condition::READABLE;
            }
            if event.is_writable() {
                condition |= Condition::WRITABLE;
            }
            if event.is_read_closed() || event.is_write_closed() {
                condition |= Condition::HANGUP;
            }
            if event.is_error() {
                condition |= Condition::ERROR;
            }
            mailbox.push((id, condition));
        }

        // Priority-ordered dispatch: highest priority first. Stable sort
        // preserves the mio-reported order within a priority tier.
        mailbox.sort_by(|(a, _), (b, _)| {
            let pa = self.sockets.get(a.0).map(|e| e.socket.priority());
            let pb = self.sockets.get(b.0).map(|e| e.socket.priority());
            pa.cmp(&pb)
        });

        for (id, condition) in mailbox {
            let Some(entry) = self.sockets.get_mut(id.0) else {
                continue;
            };
            entry.socket.record_observed(condition);

            // Tie-break: a write-ready edge on a still-Connecting socket
            // completes the connect before any coincident read bit is
            // surfaced. The read bit is never dropped — if present it is
            // delivered in a second `on_ready` call, once the connect has
            // resolved, within this same dispatch.
            if entry.socket.state() == SocketState::Connecting && condition.contains(Condition::WRITABLE) {
                let connect_condition = condition.difference(Condition::READABLE);
                handler.on_ready(id, &mut entry.socket, connect_condition)?;

                if condition.contains(Condition::READABLE) {
                    let Some(entry) = self.sockets.get_mut(id.0) else {
                        continue;
                    };
                    if entry.socket.state() != SocketState::Connecting {
                        handler.on_ready(id, &mut entry.socket, Condition::READABLE)?;
                    }
                }
                continue;
            }

            handler.on_ready(id, &mut entry.socket, condition)?;
        }

        self.sweep_connect_timeouts(handler, now);
        Ok(())
    }

    fn sweep_connect_timeouts(&mut self, handler: &mut dyn ReactorHandler, now: Instant) {
        let expired: Vec<SocketId> = self
            .sockets
            .iter()
            .filter(|(_, entry)| {
                entry.socket.state() == SocketState::Connecting
                    && entry.socket.connect_deadline().is_some_and(|deadline| now >= deadline)
            })
            .map(|(index, _)| SocketId(index))
            .collect();

        for id in expired {
            if let Some(entry) = self.sockets.get_mut(id.0) {
                handler.on_connect_timeout(id, &mut entry.socket);
            }
        }
    }
}
