//! The layered stream stack, `spec.md` §4.B component D: `RawStream →
//! ThrottledStream → [TlsStream] → BufferedStream`, read direction
//! bottom to top; the write direction is the mirror.
//!
//! Each layer only depends on the one below it through
//! `eventdance_core::stream::{InputLayer, OutputLayer}`, so the TLS
//! layer (built in `eventdance-tls`, optional per socket) slots in
//! between `throttled` and `buffered` without either of those knowing
//! it exists.

pub mod buffered;
pub mod raw;
pub mod throttled;

pub use buffered::{BufferedInputStream, BufferedOutputStream};
pub use raw::{RawInputStream, RawOutputStream};
pub use throttled::{ThrottledInputStream, ThrottledOutputStream};

use eventdance_core::error::CoreError;
use eventdance_core::stream::{InputLayer, OutputLayer, ReadOutcome, StreamEventSink, WriteOutcome};

/// The read-direction stack with TLS omitted: `Raw → Throttled →
/// Buffered`. `eventdance-tls` provides a parallel type that slots a
/// `TlsInputStream` between the throttled and buffered layers for
/// sockets that started TLS.
pub type PlainInputStack<S> = BufferedInputStream<ThrottledInputStream<RawInputStream<S>>>;

/// The write-direction mirror of [`PlainInputStack`].
pub type PlainOutputStack<S> = BufferedOutputStream<ThrottledOutputStream<RawOutputStream<S>>>;

/// Builds the plain (non-TLS) read stack over a raw transport `S`.
pub fn plain_input_stack<S: std::io::Read + Send>(
    transport: S,
    throttles: Vec<std::sync::Arc<crate::throttle::Throttle>>,
) -> PlainInputStack<S> {
    let raw = RawInputStream::new(transport);
    let throttled = ThrottledInputStream::new(raw, throttles);
    BufferedInputStream::new(throttled)
}

/// Builds the plain (non-TLS) write stack over a raw transport `S`,
/// with a write-behind buffer of `buffer_capacity` bytes.
pub fn plain_output_stack<S: std::io::Write + Send>(
    transport: S,
    throttles: Vec<std::sync::Arc<crate::throttle::Throttle>>,
    buffer_capacity: usize,
) -> PlainOutputStack<S> {
    let raw = RawOutputStream::new(transport);
    let throttled = ThrottledOutputStream::new(raw, throttles);
    BufferedOutputStream::new(throttled, buffer_capacity)
}

/// A type-erased input stack, used by `Connection` so it does not need
/// to be generic over "plain vs TLS".
pub trait BoxedInputStack: InputLayer {
    fn unread(&mut self, bytes: &[u8]);
    fn freeze(&mut self);
    fn thaw(&mut self);
}

impl<S: std::io::Read + Send> BoxedInputStack for PlainInputStack<S> {
    fn unread(&mut self, bytes: &[u8]) {
        BufferedInputStream::unread(self, bytes)
    }

    fn freeze(&mut self) {
        BufferedInputStream::freeze(self)
    }

    fn thaw(&mut self) {
        BufferedInputStream::thaw(self)
    }
}

/// A type-erased output stack.
pub trait BoxedOutputStack: OutputLayer {
    fn drive(&mut self, sink: &mut dyn StreamEventSink) -> Result<(), CoreError>;
    fn pending_len(&self) -> usize;

    /// Hands the buffered layer's internal buffer back to `pool` and
    /// installs a freshly-acquired one in its place. Called by
    /// `Connection::close` so a closed connection's buffer is recycled
    /// rather than dropped (`SPEC_FULL.md` §4.B).
    fn reclaim_buffer(&mut self, pool: &crate::buffer_pool::BufferPool);
}

impl<S: std::io::Write + Send> BoxedOutputStack for PlainOutputStack<S> {
    fn drive(&mut self, sink: &mut dyn StreamEventSink) -> Result<(), CoreError> {
        BufferedOutputStream::drive(self, sink)
    }

    fn pending_len(&self) -> usize {
        BufferedOutputStream::pending_len(self)
    }

    fn reclaim_buffer(&mut self, pool: &crate::buffer_pool::BufferPool) {
        let fresh = pool.acquire();
        let stale = BufferedOutputStream::swap_buffer(self, fresh);
        pool.release(stale);
    }
}

/// Drains an input stack until it reports `WouldBlock`/`Eof`, feeding
/// every chunk to `on_chunk`. This is the "accept-loop-until-WouldBlock"
/// discipline `spec.md` §4.A requires of edge-triggered readiness,
/// applied uniformly to reads.
pub fn drain_until_blocked(
    stack: &mut dyn InputLayer,
    scratch: &mut [u8],
    mut on_chunk: impl FnMut(&[u8]),
) -> Result<ReadOutcome, CoreError> {
    loop {
        match stack.read(scratch)? {
            ReadOutcome::Bytes(n) => on_chunk(&scratch[..n]),
            other => return Ok(other),
        }
    }
}

/// Pushes `data` through a write stack, returning once it is fully
/// accepted (buffered or physically written) or the stack reports
/// `Full`/`WouldBlock`.
pub fn write_all_or_block(stack: &mut dyn OutputLayer, data: &[u8]) -> Result<WriteOutcome, CoreError> {
    let mut offset = 0;
    while offset < data.len() {
        match stack.write(&data[offset..])? {
            WriteOutcome::Bytes(0) => return Ok(WriteOutcome::WouldBlock),
            WriteOutcome::Bytes(n) => offset += n,
            other => return Ok(other),
        }
    }
    Ok(WriteOutcome::Bytes(offset))
}
