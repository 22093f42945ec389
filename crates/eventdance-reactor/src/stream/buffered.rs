//! The buffered (top, user-facing) layer: `spec.md` §4.B "Buffered
//! input"/"Buffered output". Readahead with `unread`/`freeze`/`thaw` on
//! the input side, write-behind with no short-writes below capacity on
//! the output side.
//!
//! `BufferedOutputStream`'s internal buffer is reclaimable into a
//! `crate::buffer_pool::BufferPool` on connection close
//! (`SPEC_FULL.md` §4.B), adapting the teacher's
//! `BufferRecycler`/`PooledBuffer` discipline in `spark-buffer` from a
//! checked-out-handle API to a plain swap-and-release pair, since this
//! buffer is owned outright by the layer for the connection's lifetime
//! rather than borrowed per call.

use eventdance_core::error::CoreError;
use eventdance_core::stream::{InputLayer, OutputLayer, ReadOutcome, StreamEvent, StreamEventSink, WriteOutcome};
use bytes::{Buf, BufMut, BytesMut};

/// Buffered input: serves `unread` bytes before anything pulled fresh
/// from the layer below, and suppresses delivery of newly-read bytes
/// while frozen (`spec.md` §4.B "Buffered input").
pub struct BufferedInputStream<L> {
    inner: L,
    pending: BytesMut,
    frozen: bool,
}

impl<L: InputLayer> BufferedInputStream<L> {
    pub fn new(inner: L) -> Self {
        Self {
            inner,
            pending: BytesMut::new(),
            frozen: false,
        }
    }

    /// Prepends `bytes` to the head of the pending queue so a subsequent
    /// `read` returns them first, in FIFO order relative to each other.
    pub fn unread(&mut self, bytes: &[u8]) {
        let mut combined = BytesMut::with_capacity(bytes.len() + self.pending.len());
        combined.put_slice(bytes);
        combined.put_slice(&self.pending);
        self.pending = combined;
    }

    /// Suspends delivery of newly-read bytes; already-pending bytes
    /// (from a prior `unread`) remain servable.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// Resumes delivery at the socket's current priority. The caller
    /// (the owning `Connection`) is responsible for re-arming the
    /// watched mask at that priority; this method only clears the flag.
    pub fn thaw(&mut self) {
        self.frozen = false;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    fn drain_pending(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.pending.len());
        if n > 0 {
            buf[..n].copy_from_slice(&self.pending[..n]);
            self.pending.advance(n);
        }
        n
    }
}

impl<L: InputLayer> InputLayer for BufferedInputStream<L> {
    fn read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome, CoreError> {
        if !self.pending.is_empty() {
            let n = self.drain_pending(buf);
            return Ok(ReadOutcome::Bytes(n));
        }
        if self.frozen {
            return Ok(ReadOutcome::WouldBlock);
        }
        self.inner.read(buf)
    }
}

/// Buffered output: writes accumulate in an internal buffer up to
/// `capacity` and are never short below it; the layer below is drained
/// opportunistically by `flush` or `drive` (called when `writable`
/// readiness resumes).
pub struct BufferedOutputStream<L> {
    inner: L,
    buffer: BytesMut,
    capacity: usize,
}

impl<L: OutputLayer> BufferedOutputStream<L> {
    pub fn new(inner: L, capacity: usize) -> Self {
        Self {
            inner,
            buffer: BytesMut::with_capacity(capacity),
            capacity,
        }
    }

    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Swaps in `replacement` as the internal buffer, returning the
    /// previous one so the caller can hand it to a `BufferPool`
    /// (`SPEC_FULL.md` §4.B's per-reactor buffer free-list).
    pub fn swap_buffer(&mut self, replacement: BytesMut) -> BytesMut {
        std::mem::replace(&mut self.buffer, replacement)
    }

    /// Pushes as much of the internal buffer down to the layer below as
    /// it will currently accept. Called on `write`-readiness; emits
    /// `Drained` through `sink` once the buffer empties entirely.
    pub fn drive(&mut self, sink: &mut dyn StreamEventSink) -> Result<(), CoreError> {
        while !self.buffer.is_empty() {
            match self.inner.write(&self.buffer)? {
                WriteOutcome::Bytes(0) => break,
                WriteOutcome::Bytes(n) => {
                    self.buffer.advance(n);
                }
                WriteOutcome::WouldBlock | WriteOutcome::Full => break,
            }
        }
        if self.buffer.is_empty() {
            sink.on_stream_event(StreamEvent::Drained);
        }
        Ok(())
    }
}

impl<L: OutputLayer> OutputLayer for BufferedOutputStream<L> {
    fn write(&mut self, buf: &[u8]) -> Result<WriteOutcome, CoreError> {
        if self.buffer.len() + buf.len() > self.capacity {
            return Ok(WriteOutcome::Full);
        }
        self.buffer.put_slice(buf);
        Ok(WriteOutcome::Bytes(buf.len()))
    }

    fn flush(&mut self) -> Result<(), CoreError> {
        while !self.buffer.is_empty() {
            match self.inner.write(&self.buffer)? {
                WriteOutcome::Bytes(0) => break,
                WriteOutcome::Bytes(n) => self.buffer.advance(n),
                WriteOutcome::WouldBlock | WriteOutcome::Full => break,
            }
        }
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::raw::{RawInputStream, RawOutputStream};
    use std::io::Cursor;

    #[test]
    fn unread_then_read_returns_fifo_order() {
        let raw = RawInputStream::new(Cursor::new(b"GETHTT".to_vec()));
        let mut stream = BufferedInputStream::new(raw);

        let mut head = [0u8; 3];
        assert_eq!(stream.read(&mut head).unwrap(), ReadOutcome::Bytes(3));
        assert_eq!(&head, b"GET");

        stream.unread(b"GET");

        let mut all = [0u8; 6];
        assert_eq!(stream.read(&mut all).unwrap(), ReadOutcome::Bytes(3));
        assert_eq!(&all[..3], b"GET");
        assert_eq!(stream.read(&mut all).unwrap(), ReadOutcome::Bytes(3));
        assert_eq!(&all[..3], b"HTT");
    }

    #[test]
    fn frozen_stream_suppresses_fresh_reads_but_serves_pending() {
        let raw = RawInputStream::new(Cursor::new(b"abc".to_vec()));
        let mut stream = BufferedInputStream::new(raw);
        stream.unread(b"xy");
        stream.freeze();

        let mut buf = [0u8; 8];
        assert_eq!(stream.read(&mut buf).unwrap(), ReadOutcome::Bytes(2));
        assert_eq!(&buf[..2], b"xy");
        assert_eq!(stream.read(&mut buf).unwrap(), ReadOutcome::WouldBlock);

        stream.thaw();
        assert_eq!(stream.read(&mut buf).unwrap(), ReadOutcome::Bytes(3));
    }

    #[test]
    fn buffered_output_never_short_writes_below_capacity() {
        let inner = RawOutputStream::new(Vec::<u8>::new());
        let mut stream = BufferedOutputStream::new(inner, 16);
        assert_eq!(stream.write(b"hello").unwrap(), WriteOutcome::Bytes(5));
        assert_eq!(stream.pending_len(), 5);
    }

    #[test]
    fn buffered_output_reports_full_above_capacity() {
        let inner = RawOutputStream::new(Vec::<u8>::new());
        let mut stream = BufferedOutputStream::new(inner, 4);
        assert_eq!(stream.write(b"hello").unwrap(), WriteOutcome::Full);
    }
}

#[cfg(test)]
mod properties {
    use super::*;
    use crate::stream::raw::RawInputStream;
    use proptest::prelude::*;
    use std::io::Cursor;

    proptest! {
        /// Unreading a chunk and then reading it all back, byte for
        /// byte, always reproduces the original bytes in order ahead of
        /// whatever was already pending underneath — the FIFO guarantee
        /// `spec.md` §4.B's "Buffered input" relies on.
        #[test]
        fn unread_then_drain_reproduces_bytes_in_order(
            tail in proptest::collection::vec(any::<u8>(), 0..64),
            unread_chunk in proptest::collection::vec(any::<u8>(), 0..64),
        ) {
            let raw = RawInputStream::new(Cursor::new(tail.clone()));
            let mut stream = BufferedInputStream::new(raw);
            stream.unread(&unread_chunk);

            let mut collected = Vec::new();
            let mut scratch = [0u8; 17];
            loop {
                match stream.read(&mut scratch).unwrap() {
                    ReadOutcome::Bytes(n) => collected.extend_from_slice(&scratch[..n]),
                    ReadOutcome::Eof | ReadOutcome::WouldBlock => break,
                }
            }

            let mut expected = unread_chunk;
            expected.extend_from_slice(&tail);
            prop_assert_eq!(collected, expected);
        }
    }
}
