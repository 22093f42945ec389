//! The streaming JSON object boundary detector, `spec.md` §4.F
//! "Framing": "the engine consumes bytes through a streaming JSON
//! object boundary detector that emits one complete object per
//! packet. Partial objects are buffered; malformed input surfaces an
//! error without crashing the connection."
//!
//! Tracks brace depth and string/escape state byte-by-byte so a `}`
//! inside a quoted string never closes an object early.

use bytes::{Buf, Bytes, BytesMut};
use eventdance_core::error::{codes, CoreError, ErrorCategory};

#[derive(Default)]
pub struct JsonFrameDecoder {
    buffer: BytesMut,
    scan_pos: usize,
    depth: i32,
    in_string: bool,
    escaped: bool,
}

impl JsonFrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds newly-arrived bytes and returns every complete JSON object
    /// now available, in arrival order. Leftover partial bytes remain
    /// buffered for the next call.
    pub fn feed(&mut self, data: &[u8]) -> Result<Vec<Bytes>, CoreError> {
        self.buffer.extend_from_slice(data);
        let mut complete = Vec::new();

        loop {
            while self.depth == 0 && !self.buffer.is_empty() && self.buffer[0].is_ascii_whitespace() {
                self.buffer.advance(1);
            }
            if self.buffer.is_empty() {
                break;
            }
            if self.depth == 0 && self.buffer[0] != b'{' {
                return Err(CoreError::new(codes::RPC_MALFORMED, "expected '{' at top-level object boundary")
                    .with_category(ErrorCategory::PeerLocal));
            }

            let mut i = self.scan_pos;
            let mut found_end = None;
            while i < self.buffer.len() {
                let byte = self.buffer[i];
                if self.in_string {
                    if self.escaped {
                        self.escaped = false;
                    } else if byte == b'\\' {
                        self.escaped = true;
                    } else if byte == b'"' {
                        self.in_string = false;
                    }
                } else {
                    match byte {
                        b'"' => self.in_string = true,
                        b'{' => self.depth += 1,
                        b'}' => {
                            self.depth -= 1;
                            if self.depth < 0 {
                                return Err(CoreError::new(codes::RPC_MALFORMED, "unbalanced '}' in JSON stream")
                                    .with_category(ErrorCategory::PeerLocal));
                            }
                            if self.depth == 0 {
                                found_end = Some(i);
                            }
                        }
                        _ => {}
                    }
                }
                i += 1;
                if found_end.is_some() {
                    break;
                }
            }
            self.scan_pos = i;

            match found_end {
                Some(end) => {
                    let frame = self.buffer.split_to(end + 1).freeze();
                    complete.push(frame);
                    self.scan_pos = 0;
                }
                None => break,
            }
        }

        Ok(complete)
    }

    pub fn has_pending_partial(&self) -> bool {
        !self.buffer.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_object_arriving_whole_is_emitted_immediately() {
        let mut decoder = JsonFrameDecoder::new();
        let frames = decoder.feed(br#"{"id":"1","method":"ping","params":[]}"#).unwrap();
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn object_split_across_feeds_is_buffered_until_complete() {
        let mut decoder = JsonFrameDecoder::new();
        assert!(decoder.feed(br#"{"id":"1","met"#).unwrap().is_empty());
        assert!(decoder.has_pending_partial());
        let frames = decoder.feed(br#"hod":"ping","params":[]}"#).unwrap();
        assert_eq!(frames.len(), 1);
        assert!(!decoder.has_pending_partial());
    }

    #[test]
    fn brace_inside_string_does_not_close_object_early() {
        let mut decoder = JsonFrameDecoder::new();
        let frames = decoder.feed(br#"{"id":"1","method":"say","params":["a}b"]}"#).unwrap();
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn two_objects_in_one_chunk_both_emitted() {
        let mut decoder = JsonFrameDecoder::new();
        let frames = decoder.feed(br#"{"id":"1","method":"a","params":[]}{"id":"2","method":"b","params":[]}"#).unwrap();
        assert_eq!(frames.len(), 2);
    }

    #[test]
    fn unexpected_leading_token_is_malformed() {
        let mut decoder = JsonFrameDecoder::new();
        let err = decoder.feed(b"not-json").unwrap_err();
        assert_eq!(err.code(), codes::RPC_MALFORMED);
    }
}
