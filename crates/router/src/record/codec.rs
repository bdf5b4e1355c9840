//! Newline-delimited JSON framing for the TCP listener.
//!
//! The codec only splits the byte stream into lines; turning a line into a
//! [`LogRecord`](super::LogRecord) happens afterwards so that one bad line
//! never poisons the rest of the connection.

use std::io;

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::Decoder;

use super::MAX_LINE_SIZE;

/// One unit produced by [`JsonLinesCodec`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A complete line, without its terminator.
    Line(Bytes),
    /// A line longer than the limit was skipped; carries its length in bytes.
    Oversized(usize),
}

/// Splits a stream on `\n`, strips a trailing `\r`, skips blank lines and
/// discards lines longer than `max_length` without failing the stream.
#[derive(Debug)]
pub struct JsonLinesCodec {
    max_length: usize,
    /// Where to resume scanning for `\n` in the buffer
    next_index: usize,
    /// Bytes thrown away so far while skipping an oversized line
    discarding: Option<usize>,
}

impl JsonLinesCodec {
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_SIZE)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            max_length,
            next_index: 0,
            discarding: None,
        }
    }

    fn take_line(&mut self, buf: &mut BytesMut, end: usize, consumed: usize) -> Option<Frame> {
        let mut line = buf.split_to(consumed);
        self.next_index = 0;
        line.truncate(end);
        if line.last() == Some(&b'\r') {
            line.truncate(end - 1);
        }

        if line.len() > self.max_length {
            return Some(Frame::Oversized(line.len()));
        }
        if line.iter().all(u8::is_ascii_whitespace) {
            return None;
        }
        Some(Frame::Line(line.freeze()))
    }
}

/// Length of an unterminated line as it will be measured once complete.
/// A trailing `\r` may be the first half of `\r\n`, so it is not counted.
fn pending_len(buf: &BytesMut) -> usize {
    match buf.last() {
        Some(b'\r') => buf.len() - 1,
        _ => buf.len(),
    }
}

impl Default for JsonLinesCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for JsonLinesCodec {
    type Item = Frame;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>, io::Error> {
        loop {
            let newline = buf[self.next_index..]
                .iter()
                .position(|b| *b == b'\n')
                .map(|offset| offset + self.next_index);

            if let Some(skipped) = self.discarding {
                return match newline {
                    Some(pos) => {
                        buf.advance(pos + 1);
                        self.next_index = 0;
                        self.discarding = None;
                        Ok(Some(Frame::Oversized(skipped + pos)))
                    }
                    None => {
                        let len = buf.len();
                        buf.advance(len);
                        self.next_index = 0;
                        self.discarding = Some(skipped + len);
                        Ok(None)
                    }
                };
            }

            match newline {
                Some(pos) => match self.take_line(buf, pos, pos + 1) {
                    Some(frame) => return Ok(Some(frame)),
                    // blank line, keep scanning
                    None => continue,
                },
                None if pending_len(buf) > self.max_length => {
                    let len = buf.len();
                    buf.advance(len);
                    self.next_index = 0;
                    self.discarding = Some(len);
                    return Ok(None);
                }
                None => {
                    self.next_index = buf.len();
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>, io::Error> {
        if let Some(frame) = self.decode(buf)? {
            return Ok(Some(frame));
        }
        if let Some(skipped) = self.discarding.take() {
            buf.clear();
            self.next_index = 0;
            return Ok(Some(Frame::Oversized(skipped)));
        }
        if buf.is_empty() {
            return Ok(None);
        }
        // Peer closed without a trailing newline: flush what is left.
        let len = buf.len();
        Ok(self.take_line(buf, len, len))
    }
}
