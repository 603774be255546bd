//! JSON Lines framing: one compact JSON document per `\n`-terminated line.

use std::io::{BufRead, Write};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::WireError;

/// Largest accepted frame, excluding the terminating newline.
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Serialises `frame` as one newline-terminated line.
///
/// # Errors
///
/// Returns [`WireError::Serialize`] when the value cannot be rendered and
/// [`WireError::FrameTooLarge`] when the line would exceed
/// [`MAX_FRAME_BYTES`], which the receiving [`FrameReader`] would refuse.
pub fn encode_frame<T>(frame: &T) -> Result<Vec<u8>, WireError>
where
    T: Serialize + ?Sized,
{
    let mut line = serde_json::to_vec(frame).map_err(WireError::Serialize)?;
    if line.len() > MAX_FRAME_BYTES {
        return Err(WireError::FrameTooLarge {
            size: line.len(),
            max: MAX_FRAME_BYTES,
        });
    }
    line.push(b'\n');
    Ok(line)
}

/// Serialises `frame` as one line and flushes the writer.
///
/// # Errors
///
/// Propagates [`encode_frame`] errors and returns [`WireError::Io`] when the
/// write fails.
pub fn write_frame<W, T>(writer: &mut W, frame: &T) -> Result<(), WireError>
where
    W: Write + ?Sized,
    T: Serialize + ?Sized,
{
    let line = encode_frame(frame)?;
    writer.write_all(&line)?;
    writer.flush()?;
    Ok(())
}

/// Decodes a single frame from raw line bytes.
///
/// Leading and trailing whitespace, including the newline, is ignored.
///
/// # Errors
///
/// Returns [`WireError::Malformed`] when the bytes are not a valid frame.
pub fn decode<T: DeserializeOwned>(line: &[u8]) -> Result<T, WireError> {
    let text = std::str::from_utf8(line).map_err(|error| WireError::Malformed {
        message: format!("frame is not valid UTF-8: {error}"),
        source: None,
    })?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(WireError::Malformed {
            message: String::from("frame is empty"),
            source: None,
        });
    }
    serde_json::from_str(trimmed).map_err(WireError::malformed)
}

/// Reads newline-delimited frames, refusing lines over a byte limit.
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
    max_bytes: usize,
    buffer: Vec<u8>,
}

impl<R: BufRead> FrameReader<R> {
    /// Wraps `inner` with the default [`MAX_FRAME_BYTES`] limit.
    pub fn new(inner: R) -> Self {
        Self::with_limit(inner, MAX_FRAME_BYTES)
    }

    /// Wraps `inner` with a custom limit.
    pub fn with_limit(inner: R, max_bytes: usize) -> Self {
        Self {
            inner,
            max_bytes,
            buffer: Vec::new(),
        }
    }

    /// Reads the next non-blank line.
    ///
    /// Returns `Ok(None)` on a clean end of stream. A partial line at end of
    /// stream is returned as a frame.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::FrameTooLarge`] when a line exceeds the limit and
    /// [`WireError::Io`] when the read fails.
    pub fn next_line(&mut self) -> Result<Option<&[u8]>, WireError> {
        loop {
            self.buffer.clear();
            if !self.fill_line()? {
                return Ok(None);
            }
            if self.buffer.iter().any(|byte| !byte.is_ascii_whitespace()) {
                return Ok(Some(self.buffer.as_slice()));
            }
        }
    }

    /// Reads and decodes the next frame.
    ///
    /// # Errors
    ///
    /// Propagates [`FrameReader::next_line`] errors and returns
    /// [`WireError::Malformed`] when the line does not decode as `T`.
    pub fn read_frame<T: DeserializeOwned>(&mut self) -> Result<Option<T>, WireError> {
        match self.next_line()? {
            Some(line) => decode(line).map(Some),
            None => Ok(None),
        }
    }

    /// Consumes the reader, returning the wrapped stream.
    pub fn into_inner(self) -> R {
        self.inner
    }

    fn fill_line(&mut self) -> Result<bool, WireError> {
        loop {
            let available = self.inner.fill_buf()?;
            if available.is_empty() {
                return Ok(!self.buffer.is_empty());
            }
            let (chunk, found_newline) = match available.iter().position(|byte| *byte == b'\n') {
                Some(index) => (available.split_at(index).0, true),
                None => (available, false),
            };
            let chunk_len = chunk.len();
            if self.buffer.len() + chunk_len > self.max_bytes {
                let size = self.buffer.len() + chunk_len;
                let consumed = available.len();
                self.inner.consume(consumed);
                return Err(WireError::FrameTooLarge {
                    size,
                    max: self.max_bytes,
                });
            }
            self.buffer.extend_from_slice(chunk);
            let consumed = if found_newline { chunk_len + 1 } else { chunk_len };
            self.inner.consume(consumed);
            if found_newline {
                return Ok(true);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use rstest::rstest;
    use serde_json::{Value, json};

    use super::*;
    use crate::frame::{CorrelationId, RequestFrame, ResponseFrame};

    #[test]
    fn written_frames_end_with_newline() {
        let mut buffer = Vec::new();
        write_frame(&mut buffer, &json!({"a": 1})).expect("write frame");
        assert_eq!(buffer, b"{\"a\":1}\n");
    }

    #[test]
    fn oversized_frames_are_not_encoded() {
        let frame = json!({"payload": "x".repeat(MAX_FRAME_BYTES)});
        let mut buffer = Vec::new();
        let error = write_frame(&mut buffer, &frame).expect_err("frame too large");
        assert!(matches!(
            error,
            WireError::FrameTooLarge { max: MAX_FRAME_BYTES, .. }
        ));
        assert!(buffer.is_empty());
    }

    #[test]
    fn reader_splits_lines_arriving_in_one_chunk() {
        let input = b"{\"a\":1}\n{\"a\":2}\n";
        let mut reader = FrameReader::new(Cursor::new(input.to_vec()));
        let first: Value = reader.read_frame().expect("read").expect("first");
        let second: Value = reader.read_frame().expect("read").expect("second");
        assert_eq!(first, json!({"a": 1}));
        assert_eq!(second, json!({"a": 2}));
    }

    #[test]
    fn reader_skips_blank_lines() {
        let input = b"\n  \n{\"correlation\":1,\"command\":\"get_user\",\"payload\":\"1\"}\n\n";
        let mut reader = FrameReader::new(Cursor::new(input.to_vec()));
        let frame: RequestFrame = reader
            .read_frame()
            .expect("read frame")
            .expect("frame present");
        assert_eq!(frame.correlation, CorrelationId::new(1));
        assert!(reader.read_frame::<RequestFrame>().expect("eof").is_none());
    }

    #[test]
    fn reader_returns_unterminated_tail() {
        let input = br#"{"correlation":4,"status":"ok","payload":null}"#;
        let mut reader = FrameReader::new(Cursor::new(input.to_vec()));
        let frame: ResponseFrame = reader
            .read_frame()
            .expect("read frame")
            .expect("frame present");
        assert_eq!(frame.correlation.get(), 4);
    }

    #[test]
    fn reader_rejects_oversized_lines() {
        let input = vec![b'x'; 64];
        let mut reader = FrameReader::with_limit(Cursor::new(input), 16);
        let error = reader.next_line().expect_err("line should be too large");
        assert!(matches!(error, WireError::FrameTooLarge { max: 16, .. }));
    }

    #[rstest]
    #[case::garbage(b"not json".as_slice())]
    #[case::blank(b"   ".as_slice())]
    #[case::invalid_utf8(&[0xff, 0xfe])]
    fn decode_rejects_malformed_input(#[case] line: &[u8]) {
        let error = decode::<Value>(line).expect_err("decode should fail");
        assert!(matches!(error, WireError::Malformed { .. }));
        assert!(!error.is_io());
    }
}
