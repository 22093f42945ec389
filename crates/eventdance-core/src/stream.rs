//! The stream-layer contract from `spec.md` §3/§4.B.
//!
//! Every layer in the stack (`Raw → Throttled → [Tls] → Buffered`) speaks
//! the same two calls — `read`/`write` — and raises the same two upward
//! notifications — `drained`/`filled` — plus, for a throttled layer, a
//! millisecond delay hint. This module defines the shared vocabulary;
//! `eventdance-reactor` implements the concrete layers and composes them.

use crate::error::CoreError;
use std::time::Duration;

/// Outcome of a single `read` call on a stream layer.
#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    /// `n` bytes were read into the caller's buffer.
    Bytes(usize),
    /// No bytes are available right now; the caller should wait for the
    /// next readiness edge (or throttle delay) rather than spin.
    WouldBlock,
    /// The layer below has reached end-of-stream; no more bytes will
    /// ever be produced.
    Eof,
}

/// Outcome of a single `write` call on a stream layer.
#[derive(Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    /// `n` bytes were accepted (which may be less than the caller asked
    /// to write — the caller is responsible for retrying the remainder).
    Bytes(usize),
    /// No bytes could be accepted right now.
    WouldBlock,
    /// The layer is at capacity and structurally cannot accept more
    /// until it is drained (distinct from `WouldBlock`, which implies
    /// "try again soon"; `Full` implies "wait for a `drained` notification").
    Full,
}

/// The two upward notifications named in `spec.md` §3, plus the
/// throttle-specific delay hints. A stream stack propagates these
/// upward so the owning socket can decide which bits of its watched
/// mask to arm or disarm — this is the mechanism that keeps the
/// reactor from ever spinning on edge-triggered readiness (§4.B).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StreamEvent {
    /// The reader consumed the layer below down to empty.
    Drained,
    /// The writer below cannot accept more data right now.
    Filled,
    /// A throttled read should wait `delay` before retrying.
    DelayRead(Duration),
    /// A throttled write should wait `delay` before retrying.
    DelayWrite(Duration),
}

/// A sink for [`StreamEvent`]s raised by a layer, installed by whatever
/// owns the stack (normally the `Connection`/`Socket` pair in
/// `eventdance-reactor`).
pub trait StreamEventSink: Send {
    fn on_stream_event(&mut self, event: StreamEvent);
}

impl<F: FnMut(StreamEvent) + Send> StreamEventSink for F {
    fn on_stream_event(&mut self, event: StreamEvent) {
        self(event)
    }
}

/// A single input-direction stream layer.
pub trait InputLayer: Send {
    fn read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome, CoreError>;
}

/// A single output-direction stream layer.
pub trait OutputLayer: Send {
    fn write(&mut self, buf: &[u8]) -> Result<WriteOutcome, CoreError>;

    /// Flushes any internally buffered bytes toward the layer below.
    /// Layers that do not buffer (e.g. `RawOutputStream`) implement this
    /// as a no-op returning `Ok(())`.
    fn flush(&mut self) -> Result<(), CoreError>;
}
