//! `Connection`, `spec.md` §4.B component F: bundles an input+output
//! stream pair into the user-visible IO object, and owns the
//! deferred-close bookkeeping described in §4.A — a hangup observed
//! while the buffered input still holds unread bytes keeps the read
//! path alive until the application drains it.

use crate::buffer_pool::BufferPool;
use crate::stream::{BoxedInputStack, BoxedOutputStack};
use eventdance_core::error::CoreError;
use eventdance_core::stream::{ReadOutcome, StreamEvent, StreamEventSink, WriteOutcome};

/// Bundles the read and write stacks for one connected socket.
///
/// Generic over the boxed stack traits rather than a single concrete
/// stack type because TLS sockets and plain sockets build different
/// concrete layer chains (see `eventdance-tls`'s `TlsInputStream`) but
/// both implement [`BoxedInputStack`]/[`BoxedOutputStack`].
pub struct Connection {
    input: Box<dyn BoxedInputStack>,
    output: Box<dyn BoxedOutputStack>,
    hangup_pending: bool,
}

impl Connection {
    pub fn new(input: Box<dyn BoxedInputStack>, output: Box<dyn BoxedOutputStack>) -> Self {
        Self {
            input,
            output,
            hangup_pending: false,
        }
    }

    pub fn read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome, CoreError> {
        self.input.read(buf)
    }

    pub fn unread(&mut self, bytes: &[u8]) {
        self.input.unread(bytes);
    }

    pub fn freeze_input(&mut self) {
        self.input.freeze();
    }

    pub fn thaw_input(&mut self) {
        self.input.thaw();
    }

    pub fn write(&mut self, buf: &[u8]) -> Result<WriteOutcome, CoreError> {
        self.output.write(buf)
    }

    pub fn flush(&mut self) -> Result<(), CoreError> {
        self.output.flush()
    }

    pub fn drive_output(&mut self, sink: &mut dyn StreamEventSink) -> Result<(), CoreError> {
        self.output.drive(sink)
    }

    pub fn has_pending_output(&self) -> bool {
        self.output.pending_len() > 0
    }

    /// Records that a hangup condition was observed. Returns `true` if
    /// the close must be deferred (unread bytes remain buffered),
    /// `false` if the caller is free to close immediately.
    pub fn note_hangup(&mut self, unread_remaining: bool) -> bool {
        self.hangup_pending = unread_remaining;
        self.hangup_pending
    }

    pub fn is_hangup_pending(&self) -> bool {
        self.hangup_pending
    }

    /// Call after every `read` that returns `Bytes(0)`-equivalent
    /// drain; once the application has consumed everything, a deferred
    /// hangup becomes an immediate one.
    pub fn clear_hangup_if_drained(&mut self, drained: bool) {
        if drained {
            self.hangup_pending = false;
        }
    }

    pub fn on_stream_event(&mut self, event: StreamEvent, sink: &mut dyn StreamEventSink) {
        sink.on_stream_event(event);
    }

    /// Reclaims the output stack's internal buffer into `pool`. The
    /// caller runs this once, as the last step of tearing down a
    /// connection.
    pub fn close(&mut self, pool: &BufferPool) {
        self.output.reclaim_buffer(pool);
    }
}
