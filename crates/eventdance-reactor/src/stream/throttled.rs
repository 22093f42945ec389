//! The throttled layer: consults every [`Throttle`] attached to the
//! socket and takes the minimum grant / maximum delay across all of
//! them, per `spec.md` §4.B "A throttle may be shared between multiple
//! sockets".

use crate::throttle::{Direction, Throttle};
use eventdance_core::error::CoreError;
use eventdance_core::stream::{InputLayer, OutputLayer, ReadOutcome, StreamEvent, WriteOutcome};
use std::sync::Arc;
use std::time::Duration;

fn combined_grant(throttles: &[Arc<Throttle>], direction: Direction, size: usize) -> (usize, Duration) {
    if throttles.is_empty() {
        return (size, Duration::ZERO);
    }
    let mut bytes = size;
    let mut delay = Duration::ZERO;
    for throttle in throttles {
        let grant = throttle.request(direction, size);
        bytes = bytes.min(grant.bytes);
        delay = delay.max(grant.delay);
    }
    (bytes, delay)
}

pub struct ThrottledInputStream<L> {
    inner: L,
    throttles: Vec<Arc<Throttle>>,
}

impl<L: InputLayer> ThrottledInputStream<L> {
    pub fn new(inner: L, throttles: Vec<Arc<Throttle>>) -> Self {
        Self { inner, throttles }
    }

    pub fn poll_delay(&self, requested: usize) -> Option<StreamEvent> {
        let (bytes, delay) = combined_grant(&self.throttles, Direction::Read, requested);
        if bytes == 0 && delay > Duration::ZERO {
            Some(StreamEvent::DelayRead(delay))
        } else {
            None
        }
    }
}

impl<L: InputLayer> InputLayer for ThrottledInputStream<L> {
    fn read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome, CoreError> {
        let (granted, _delay) = combined_grant(&self.throttles, Direction::Read, buf.len());
        if granted == 0 {
            return Ok(ReadOutcome::WouldBlock);
        }
        self.inner.read(&mut buf[..granted])
    }
}

pub struct ThrottledOutputStream<L> {
    inner: L,
    throttles: Vec<Arc<Throttle>>,
}

impl<L: OutputLayer> ThrottledOutputStream<L> {
    pub fn new(inner: L, throttles: Vec<Arc<Throttle>>) -> Self {
        Self { inner, throttles }
    }

    pub fn poll_delay(&self, requested: usize) -> Option<StreamEvent> {
        let (bytes, delay) = combined_grant(&self.throttles, Direction::Write, requested);
        if bytes == 0 && delay > Duration::ZERO {
            Some(StreamEvent::DelayWrite(delay))
        } else {
            None
        }
    }
}

impl<L: OutputLayer> OutputLayer for ThrottledOutputStream<L> {
    fn write(&mut self, buf: &[u8]) -> Result<WriteOutcome, CoreError> {
        let (granted, _delay) = combined_grant(&self.throttles, Direction::Write, buf.len());
        if granted == 0 {
            return Ok(WriteOutcome::WouldBlock);
        }
        self.inner.write(&buf[..granted])
    }

    fn flush(&mut self) -> Result<(), CoreError> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::raw::RawInputStream;
    use eventdance_core::config::ThrottleConfig;
    use eventdance_core::time::MockClock;
    use std::io::Cursor;

    #[test]
    fn zero_grant_yields_would_block_without_touching_inner() {
        let clock: Arc<MockClock> = Arc::new(MockClock::new());
        let throttle = Arc::new(Throttle::new(
            ThrottleConfig {
                bandwidth_in: 1,
                ..Default::default()
            },
            clock,
        ));
        let raw = RawInputStream::new(Cursor::new(b"abcdef".to_vec()));
        let mut stream = ThrottledInputStream::new(raw, vec![throttle]);

        let mut buf = [0u8; 6];
        let first = stream.read(&mut buf).unwrap();
        assert_eq!(first, ReadOutcome::Bytes(1));
        let second = stream.read(&mut buf).unwrap();
        assert_eq!(second, ReadOutcome::WouldBlock);
    }
}
