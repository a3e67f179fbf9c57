//! Line codec for tokio.
//!
//! Frames the TCP byte stream into protocol lines. A line ends at LF
//! (CRLF preferred, bare LF tolerated). Complete lines longer than the
//! RFC cap are truncated to 510 bytes before they reach the parser;
//! a partial line that outgrows the pending buffer is a framing fault
//! that tears the session down.

use bytes::BytesMut;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

use crate::message::Message;

/// Maximum wire line length, CRLF included.
pub const MAX_LINE_LEN: usize = 512;

/// Maximum bytes buffered without a terminator (the recv-q).
pub const MAX_PENDING_BYTES: usize = 4096;

/// Framing failures. All of these are session-fatal.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("recv-q exceeded: {0} bytes pending without a line terminator")]
    RecvQExceeded(usize),
    #[error("line is not valid UTF-8")]
    InvalidUtf8,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Splits inbound bytes into lines and serializes outbound messages.
#[derive(Debug, Default)]
pub struct LineCodec {
    /// Next byte to check for LF, so partial reads are not rescanned.
    next_index: usize,
}

/// Largest prefix of `s` that is at most `max` bytes and ends on a char
/// boundary.
fn truncate_at_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, CodecError> {
        let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') else {
            self.next_index = src.len();
            if src.len() > MAX_PENDING_BYTES {
                return Err(CodecError::RecvQExceeded(src.len()));
            }
            return Ok(None);
        };

        let line = src.split_to(self.next_index + offset + 1);
        self.next_index = 0;

        let mut end = line.len() - 1;
        if end > 0 && line[end - 1] == b'\r' {
            end -= 1;
        }
        let text = std::str::from_utf8(&line[..end]).map_err(|_| CodecError::InvalidUtf8)?;
        Ok(Some(truncate_at_boundary(text, MAX_LINE_LEN - 2).to_string()))
    }
}

impl Encoder<Message> for LineCodec {
    type Error = CodecError;

    fn encode(&mut self, msg: Message, dst: &mut BytesMut) -> Result<(), CodecError> {
        let line = msg.to_string();
        let line = truncate_at_boundary(&line, MAX_LINE_LEN - 2);
        dst.reserve(line.len() + 2);
        dst.extend_from_slice(line.as_bytes());
        dst.extend_from_slice(b"\r\n");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_complete_line() {
        let mut codec = LineCodec::default();
        let mut buf = BytesMut::from("PING :tok\r\nPART");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some("PING :tok".to_string()));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert_eq!(&buf[..], b"PART");
    }

    #[test]
    fn tolerates_bare_lf() {
        let mut codec = LineCodec::default();
        let mut buf = BytesMut::from("NICK alice\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some("NICK alice".to_string()));
    }

    #[test]
    fn holds_partial_lines() {
        let mut codec = LineCodec::default();
        let mut buf = BytesMut::from("USER alice 0 * ");
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b":Alice\r\n");
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some("USER alice 0 * :Alice".to_string())
        );
    }

    #[test]
    fn truncates_oversized_complete_line() {
        let mut codec = LineCodec::default();
        let mut line = format!("PRIVMSG #reef :{}", "x".repeat(600));
        line.push_str("\r\n");
        let mut buf = BytesMut::from(line.as_bytes());
        let out = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(out.len(), MAX_LINE_LEN - 2);
        assert!(out.starts_with("PRIVMSG #reef :"));
    }

    #[test]
    fn exactly_512_byte_line_passes_untruncated() {
        let mut codec = LineCodec::default();
        let body = "x".repeat(MAX_LINE_LEN - 2 - "PRIVMSG #reef :".len());
        let line = format!("PRIVMSG #reef :{body}\r\n");
        assert_eq!(line.len(), MAX_LINE_LEN);
        let mut buf = BytesMut::from(line.as_bytes());
        let out = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(out.len(), MAX_LINE_LEN - 2);
        assert!(out.ends_with(&body));
    }

    #[test]
    fn recvq_overflow_is_fatal() {
        let mut codec = LineCodec::default();
        let mut buf = BytesMut::from("y".repeat(MAX_PENDING_BYTES + 1).as_bytes());
        assert!(matches!(
            codec.decode(&mut buf),
            Err(CodecError::RecvQExceeded(_))
        ));
    }

    #[test]
    fn rejects_invalid_utf8() {
        let mut codec = LineCodec::default();
        let mut buf = BytesMut::from(&[0x50, 0xff, 0xfe, b'\r', b'\n'][..]);
        assert!(matches!(codec.decode(&mut buf), Err(CodecError::InvalidUtf8)));
    }

    #[test]
    fn encodes_with_crlf() {
        let mut codec = LineCodec::default();
        let mut buf = BytesMut::new();
        codec
            .encode(Message::cmd("PONG").param("reef.local").trailing("tok"), &mut buf)
            .unwrap();
        assert_eq!(&buf[..], b"PONG reef.local :tok\r\n");
    }

    #[test]
    fn encoded_lines_never_exceed_the_cap() {
        let mut codec = LineCodec::default();
        let mut buf = BytesMut::new();
        let msg = Message::cmd("PRIVMSG").param("#reef").trailing("z".repeat(1000));
        codec.encode(msg, &mut buf).unwrap();
        assert_eq!(buf.len(), MAX_LINE_LEN);
        assert!(buf.ends_with(b"\r\n"));
    }
}
