//! Line framing codec for Bifrost streams.
//!
//! Splits the byte stream on `\n` and runs each line through the parser. A
//! malformed line is yielded as an `Err` item rather than a decoder error, so
//! one bad line never tears down the framed stream. Only connection-level
//! problems (oversized lines, EOF mid-line, I/O) are `io::Error`s.

use std::io;

use tokio_util::bytes::BytesMut;
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, Decoder, Encoder};

use super::message::Message;
use super::parse::{ParseError, line_to_message};

/// Upper bound on a single line, newline excluded.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Codec that frames Bifrost messages as newline-terminated lines.
///
/// Wraps `AnyDelimiterCodec` for the framing and parses each line.
#[derive(Debug, Clone)]
pub struct BifrostCodec {
    inner: AnyDelimiterCodec,
}

impl Default for BifrostCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl BifrostCodec {
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_LENGTH)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            inner: AnyDelimiterCodec::new_with_max_length(
                b"\n".to_vec(),
                b"\n".to_vec(),
                max_length,
            ),
        }
    }

    pub fn max_length(&self) -> usize {
        self.inner.max_length()
    }
}

fn framing_error(e: AnyDelimiterCodecError) -> io::Error {
    match e {
        AnyDelimiterCodecError::MaxChunkLengthExceeded => {
            io::Error::new(io::ErrorKind::InvalidData, "line exceeds maximum length")
        }
        AnyDelimiterCodecError::Io(e) => e,
    }
}

fn decode_line(raw: &[u8]) -> Result<Message, ParseError> {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    let line = std::str::from_utf8(raw).map_err(|_| ParseError::InvalidUtf8)?;
    line_to_message(line)
}

impl Decoder for BifrostCodec {
    type Item = Result<Message, ParseError>;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let line = self.inner.decode(src).map_err(framing_error)?;
        Ok(line.map(|line| decode_line(&line)))
    }

    /// Unlike the inner codec, a trailing partial line is an error rather
    /// than a final frame.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(item) = self.decode(src)? {
            return Ok(Some(item));
        }
        if src.is_empty() {
            Ok(None)
        } else {
            tracing::trace!(pending_bytes = src.len(), "Stream ended mid-line");
            Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed in the middle of a line",
            ))
        }
    }
}

impl Encoder<Message> for BifrostCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        tracing::trace!(verb = item.verb(), "Encoding line");
        self.inner
            .encode(item.to_string(), dst)
            .map_err(framing_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(codec: &mut BifrostCodec, buf: &mut BytesMut) -> Vec<Result<Message, ParseError>> {
        let mut out = Vec::new();
        while let Some(item) = codec.decode(buf).unwrap() {
            out.push(item);
        }
        out
    }

    #[test]
    fn decodes_complete_lines() {
        let mut codec = BifrostCodec::new();
        let mut buf = BytesMut::from("! IAMA saucepan\nf00f STOP 'hammer time'\n");

        let items = decode_all(&mut codec, &mut buf);
        assert_eq!(
            items,
            vec![
                Ok(Message::new("!", "IAMA").with_arg("saucepan")),
                Ok(Message::new("f00f", "STOP").with_arg("hammer time")),
            ]
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn waits_for_the_rest_of_a_line() {
        let mut codec = BifrostCodec::new();
        let mut buf = BytesMut::from("! IA");
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"MA saucepan\n");
        let msg = codec.decode(&mut buf).unwrap().unwrap().unwrap();
        assert_eq!(msg, Message::new("!", "IAMA").with_arg("saucepan"));
    }

    #[test]
    fn tolerates_crlf() {
        let mut codec = BifrostCodec::new();
        let mut buf = BytesMut::from("x dump\r\n");
        let msg = codec.decode(&mut buf).unwrap().unwrap().unwrap();
        assert_eq!(msg, Message::new("x", "dump"));
    }

    #[test]
    fn malformed_line_does_not_stop_decoding() {
        let mut codec = BifrostCodec::new();
        let mut buf = BytesMut::from(&b"x auto 'on\nlonely\n\xff\xfe zz\nx auto on\n"[..]);

        let items = decode_all(&mut codec, &mut buf);
        assert_eq!(
            items,
            vec![
                Err(ParseError::UnterminatedQuote),
                Err(ParseError::TooShort(1)),
                Err(ParseError::InvalidUtf8),
                Ok(Message::new("x", "auto").with_arg("on")),
            ]
        );
    }

    #[test]
    fn oversized_line_is_a_stream_error() {
        let mut codec = BifrostCodec::with_max_length(8);
        let mut buf = BytesMut::from("x enqueue 0 much-too-long");
        let err = codec.decode(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn decoding_resumes_after_partial_reads() {
        let mut codec = BifrostCodec::with_max_length(16);
        let mut buf = BytesMut::from("x auto");
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b" on\nx du");
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(Ok(Message::new("x", "auto").with_arg("on")))
        );
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b"mp\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Ok(Message::new("x", "dump"))));
        assert_eq!(codec.max_length(), 16);
    }

    #[test]
    fn eof_mid_line_is_an_error() {
        let mut codec = BifrostCodec::new();
        let mut buf = BytesMut::from("! IAMA sauce");
        let err = codec.decode_eof(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn clean_eof_yields_none() {
        let mut codec = BifrostCodec::new();
        let mut buf = BytesMut::new();
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
    }

    #[test]
    fn encodes_packed_lines() {
        let mut codec = BifrostCodec::new();
        let mut buf = BytesMut::new();

        codec
            .encode(Message::new("!", "IAMA").with_arg("chest of drawers"), &mut buf)
            .unwrap();
        codec.encode(Message::new("i386", "blorf"), &mut buf).unwrap();

        assert_eq!(&buf[..], b"! IAMA 'chest of drawers'\ni386 blorf\n");
    }
}
