//! Slots `TlsSession` into the layered stream stack between the
//! throttled and buffered layers (`SPEC_FULL.md` §4.C), the piece
//! `eventdance-reactor::stream::mod`'s own doc comment promises but
//! leaves for this crate to provide.
//!
//! `TlsInputStream`/`TlsOutputStream` wrap an inner layer `L` plus a
//! session shared with their counterpart on the other direction (a
//! handshake flight read in on the input side has to be pushed out on
//! the output side, and vice versa, so both halves hold the same
//! `Arc<Mutex<TlsSession>>`). Driving the handshake from a plain `read`
//! or `write` call — rather than requiring the caller to pump
//! `pull_tls`/`push_tls` directly — mirrors how the teacher's
//! `spark-transport-tls` hid `rustls`'s I/O behind a transport that
//! just looked like any other `Read`/`Write` pair.

use crate::session::TlsSession;
use eventdance_core::error::{CoreError, ErrorCategory};
use eventdance_core::stream::{InputLayer, OutputLayer, ReadOutcome, StreamEventSink, WriteOutcome};
use eventdance_reactor::stream::{
    BoxedInputStack, BoxedOutputStack, BufferedInputStream, BufferedOutputStream, RawInputStream, RawOutputStream,
    ThrottledInputStream, ThrottledOutputStream,
};
use eventdance_reactor::{BufferPool, Throttle};
use std::io;
use std::sync::{Arc, Mutex};

/// Adapts an `&mut L: InputLayer` into `std::io::Read` so `TlsSession::pull_tls`
/// (which wants `&mut dyn Read`) can pull ciphertext from the layer below.
struct ReadAdapter<'a, L: ?Sized>(&'a mut L);

impl<'a, L: InputLayer + ?Sized> io::Read for ReadAdapter<'a, L> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.0.read(buf) {
            Ok(ReadOutcome::Bytes(n)) => Ok(n),
            Ok(ReadOutcome::Eof) => Ok(0),
            Ok(ReadOutcome::WouldBlock) => Err(io::Error::from(io::ErrorKind::WouldBlock)),
            Err(err) => Err(io::Error::new(io::ErrorKind::Other, err)),
        }
    }
}

/// The output-side mirror of [`ReadAdapter`], feeding `TlsSession::push_tls`.
struct WriteAdapter<'a, L: ?Sized>(&'a mut L);

impl<'a, L: OutputLayer + ?Sized> io::Write for WriteAdapter<'a, L> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.0.write(buf) {
            Ok(WriteOutcome::Bytes(n)) => Ok(n),
            Ok(WriteOutcome::WouldBlock) | Ok(WriteOutcome::Full) => Err(io::Error::from(io::ErrorKind::WouldBlock)),
            Err(err) => Err(io::Error::new(io::ErrorKind::Other, err)),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush().map_err(|err| io::Error::new(io::ErrorKind::Other, err))
    }
}

fn is_transient(err: &CoreError) -> bool {
    err.category() == ErrorCategory::Transient
}

/// The TLS input layer: serves plaintext already sitting in the
/// session's record buffer, otherwise pulls a round of ciphertext from
/// `inner` and retries once.
pub struct TlsInputStream<L> {
    inner: L,
    session: Arc<Mutex<TlsSession>>,
}

impl<L: InputLayer> TlsInputStream<L> {
    pub fn new(inner: L, session: Arc<Mutex<TlsSession>>) -> Self {
        Self { inner, session }
    }
}

impl<L: InputLayer> InputLayer for TlsInputStream<L> {
    fn read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome, CoreError> {
        let mut session = self.session.lock().expect("tls session mutex poisoned");

        let n = session.read_plaintext(buf)?;
        if n > 0 {
            return Ok(ReadOutcome::Bytes(n));
        }

        let pulled = {
            let mut adapter = ReadAdapter(&mut self.inner);
            match session.pull_tls(&mut adapter) {
                Ok(read) => read,
                Err(err) if is_transient(&err) => return Ok(ReadOutcome::WouldBlock),
                Err(err) => return Err(err),
            }
        };
        if pulled == 0 {
            return Ok(ReadOutcome::Eof);
        }

        let n = session.read_plaintext(buf)?;
        Ok(if n > 0 { ReadOutcome::Bytes(n) } else { ReadOutcome::WouldBlock })
    }
}

/// The TLS output layer: queues plaintext into the session's record
/// writer, then drains every complete TLS record it produces down to
/// `inner` before returning.
pub struct TlsOutputStream<L> {
    inner: L,
    session: Arc<Mutex<TlsSession>>,
}

impl<L: OutputLayer> TlsOutputStream<L> {
    pub fn new(inner: L, session: Arc<Mutex<TlsSession>>) -> Self {
        Self { inner, session }
    }

    /// Pushes pending ciphertext out to `inner` until the session has
    /// nothing left to send or the layer below would block.
    fn drain_ciphertext(&mut self, session: &mut TlsSession) -> Result<(), CoreError> {
        loop {
            let mut adapter = WriteAdapter(&mut self.inner);
            match session.push_tls(&mut adapter) {
                Ok(0) => return Ok(()),
                Ok(_) => continue,
                Err(err) if is_transient(&err) => return Ok(()),
                Err(err) => return Err(err),
            }
        }
    }
}

impl<L: OutputLayer> OutputLayer for TlsOutputStream<L> {
    fn write(&mut self, buf: &[u8]) -> Result<WriteOutcome, CoreError> {
        let mut session = self.session.lock().expect("tls session mutex poisoned");
        let n = session.write_plaintext(buf)?;
        self.drain_ciphertext(&mut session)?;
        Ok(if n > 0 { WriteOutcome::Bytes(n) } else { WriteOutcome::WouldBlock })
    }

    fn flush(&mut self) -> Result<(), CoreError> {
        let mut session = self.session.lock().expect("tls session mutex poisoned");
        self.drain_ciphertext(&mut session)?;
        self.inner.flush()
    }
}

/// The read-direction stack for a TLS-started socket: `Raw → Throttled
/// → Tls → Buffered`, the parallel of `eventdance_reactor::stream::PlainInputStack`
/// with a `TlsInputStream` slotted in.
pub type TlsInputStack<S> = BufferedInputStream<TlsInputStream<ThrottledInputStream<RawInputStream<S>>>>;

/// The write-direction mirror of [`TlsInputStack`].
pub type TlsOutputStack<S> = BufferedOutputStream<TlsOutputStream<ThrottledOutputStream<RawOutputStream<S>>>>;

/// Builds the TLS read stack over a raw transport `S`, sharing `session`
/// with the output stack built by [`tls_output_stack`].
pub fn tls_input_stack<S: io::Read + Send>(
    transport: S,
    throttles: Vec<Arc<Throttle>>,
    session: Arc<Mutex<TlsSession>>,
) -> TlsInputStack<S> {
    let raw = RawInputStream::new(transport);
    let throttled = ThrottledInputStream::new(raw, throttles);
    let tls = TlsInputStream::new(throttled, session);
    BufferedInputStream::new(tls)
}

/// Builds the TLS write stack over a raw transport `S`, with a
/// write-behind buffer of `buffer_capacity` bytes.
pub fn tls_output_stack<S: io::Write + Send>(
    transport: S,
    throttles: Vec<Arc<Throttle>>,
    buffer_capacity: usize,
    session: Arc<Mutex<TlsSession>>,
) -> TlsOutputStack<S> {
    let raw = RawOutputStream::new(transport);
    let throttled = ThrottledOutputStream::new(raw, throttles);
    let tls = TlsOutputStream::new(throttled, session);
    BufferedOutputStream::new(tls, buffer_capacity)
}

impl<S: io::Read + Send> BoxedInputStack for TlsInputStack<S> {
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

impl<S: io::Write + Send> BoxedOutputStack for TlsOutputStack<S> {
    fn drive(&mut self, sink: &mut dyn StreamEventSink) -> Result<(), CoreError> {
        BufferedOutputStream::drive(self, sink)
    }

    fn pending_len(&self) -> usize {
        BufferedOutputStream::pending_len(self)
    }

    fn reclaim_buffer(&mut self, pool: &BufferPool) {
        let fresh = pool.acquire();
        let stale = BufferedOutputStream::swap_buffer(self, fresh);
        pool.release(stale);
    }
}
