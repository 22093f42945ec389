//! The bottom layer of the stack: a thin wrapper around the socket's
//! raw fd. `RawInputStream`/`RawOutputStream` never buffer and never
//! throttle — they translate `std::io::ErrorKind::WouldBlock` into
//! [`ReadOutcome::WouldBlock`]/[`WriteOutcome::WouldBlock`] and nothing
//! else.

use eventdance_core::error::{codes, CoreError};
use eventdance_core::stream::{InputLayer, OutputLayer, ReadOutcome, WriteOutcome};
use std::io::{self, Read, Write};

pub struct RawInputStream<S> {
    inner: S,
}

impl<S: Read> RawInputStream<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

impl<S: Read + Send> InputLayer for RawInputStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome, CoreError> {
        match self.inner.read(buf) {
            Ok(0) => Ok(ReadOutcome::Eof),
            Ok(n) => Ok(ReadOutcome::Bytes(n)),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(ReadOutcome::WouldBlock),
            Err(err) => Err(CoreError::from_io(codes::STREAM_IO, err)),
        }
    }
}

pub struct RawOutputStream<S> {
    inner: S,
}

impl<S: Write> RawOutputStream<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

impl<S: Write + Send> OutputLayer for RawOutputStream<S> {
    fn write(&mut self, buf: &[u8]) -> Result<WriteOutcome, CoreError> {
        match self.inner.write(buf) {
            Ok(n) => Ok(WriteOutcome::Bytes(n)),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(WriteOutcome::WouldBlock),
            Err(err) => Err(CoreError::from_io(codes::STREAM_IO, err)),
        }
    }

    fn flush(&mut self) -> Result<(), CoreError> {
        self.inner
            .flush()
            .map_err(|err| CoreError::from_io(codes::STREAM_IO, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn raw_input_reports_eof_at_end_of_cursor() {
        let mut stream = RawInputStream::new(Cursor::new(b"hi".to_vec()));
        let mut buf = [0u8; 8];
        assert_eq!(stream.read(&mut buf).unwrap(), ReadOutcome::Bytes(2));
        assert_eq!(stream.read(&mut buf).unwrap(), ReadOutcome::Eof);
    }
}
