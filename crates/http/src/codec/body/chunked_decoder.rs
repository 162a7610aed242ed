//! Decoder for chunked transfer coding (RFC 9112 Section 7.1).
//!
//! Each chunk is `hex-size [;ext] CRLF payload CRLF`; a zero-size chunk
//! ends the body and hands control to the trailer section. Chunk payloads
//! accumulate into a [`Blob`] with the same memory-to-file spillover as
//! fixed bodies, and each completed chunk is yielded upward so the owner
//! can release the message's ready signal in non-finished mode.

use std::task::Poll;

use bytes::{Buf, BytesMut};
use tracing::trace;

use crate::protocol::{Blob, ParseError};

use super::fixed_decoder::accumulate;

/// One step of chunk progress.
#[derive(Debug)]
pub(crate) enum ChunkEvent {
    /// A chunk's payload has been fully received.
    Chunk(Blob),
    /// The zero-size chunk was read; the trailer section follows.
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkedState {
    /// Reset per-chunk scratch, then read the size.
    Start,
    /// Hex chunk size, accumulated with overflow protection.
    Size,
    /// Whitespace after the size; no more digits may follow.
    SizeLws,
    /// `;`-prefixed extension text, captured raw up to the line end.
    Extension,
    /// LF finishing the size line.
    SizeLf,
    /// Chunk payload bytes.
    Body,
    /// CR after the payload.
    BodyCr,
    /// LF after the payload.
    BodyLf,
}

macro_rules! next_byte {
    ($src:ident) => {{
        if $src.is_empty() {
            return Poll::Pending;
        }
        $src.get_u8()
    }};
}

pub(crate) struct ChunkedDecoder {
    state: ChunkedState,
    chunk_size: u64,
    remaining: u64,
    extensions: Vec<u8>,
    payload: Blob,
    mem_limit: u64,
}

impl ChunkedDecoder {
    pub(crate) fn new(mem_limit: u64) -> Self {
        Self {
            state: ChunkedState::Start,
            chunk_size: 0,
            remaining: 0,
            extensions: Vec::new(),
            payload: Blob::new(),
            mem_limit,
        }
    }

    /// Advance until a chunk completes, the final chunk is seen, input
    /// runs dry, or a fault is hit.
    pub(crate) fn advance(&mut self, src: &mut BytesMut) -> Poll<Result<ChunkEvent, ParseError>> {
        loop {
            match self.state {
                ChunkedState::Start => {
                    self.chunk_size = 0;
                    self.extensions.clear();
                    self.payload = Blob::new();
                    self.state = ChunkedState::Size;
                }

                ChunkedState::Size => match next_byte!(src) {
                    b @ (b'0'..=b'9' | b'a'..=b'f' | b'A'..=b'F') => {
                        // Reject a digit that would overflow the
                        // accumulator (RFC 9112 Section 7.1).
                        let digit = match b {
                            b'0'..=b'9' => b - b'0',
                            b'a'..=b'f' => b - b'a' + 10,
                            _ => b - b'A' + 10,
                        } as u64;
                        self.chunk_size = match self
                            .chunk_size
                            .checked_mul(16)
                            .and_then(|size| size.checked_add(digit))
                        {
                            Some(size) => size,
                            None => return Poll::Ready(Err(ParseError::ChunkSizeOverflow)),
                        };
                    }
                    b'\t' | b' ' => self.state = ChunkedState::SizeLws,
                    b';' => self.state = ChunkedState::Extension,
                    b'\r' => self.state = ChunkedState::SizeLf,
                    b'\n' => {
                        if let Some(event) = self.finish_size_line() {
                            return Poll::Ready(Ok(event));
                        }
                    }
                    _ => return Poll::Ready(Err(chunk_fault("Error reading chunk size/extensions."))),
                },

                ChunkedState::SizeLws => match next_byte!(src) {
                    b'\t' | b' ' => {}
                    b';' => self.state = ChunkedState::Extension,
                    b'\r' => self.state = ChunkedState::SizeLf,
                    b'\n' => {
                        if let Some(event) = self.finish_size_line() {
                            return Poll::Ready(Ok(event));
                        }
                    }
                    _ => return Poll::Ready(Err(chunk_fault("Error reading chunk size/extensions."))),
                },

                ChunkedState::Extension => match next_byte!(src) {
                    b'\r' => self.state = ChunkedState::SizeLf,
                    b'\n' => {
                        if let Some(event) = self.finish_size_line() {
                            return Poll::Ready(Ok(event));
                        }
                    }
                    // Not parsed further; kept only for tracing.
                    b => self.extensions.push(b),
                },

                ChunkedState::SizeLf => match next_byte!(src) {
                    b'\n' => {
                        if let Some(event) = self.finish_size_line() {
                            return Poll::Ready(Ok(event));
                        }
                    }
                    _ => return Poll::Ready(Err(chunk_fault("Error reading chunk size/extensions."))),
                },

                ChunkedState::Body => {
                    if src.is_empty() {
                        return Poll::Pending;
                    }
                    let take = self.remaining.min(src.len() as u64) as usize;
                    let data = src.split_to(take);
                    if let Err(e) = accumulate(&mut self.payload, &data, self.mem_limit) {
                        return Poll::Ready(Err(e));
                    }
                    self.remaining -= take as u64;
                    if self.remaining == 0 {
                        self.state = ChunkedState::BodyCr;
                    }
                }

                ChunkedState::BodyCr => match next_byte!(src) {
                    b'\r' => self.state = ChunkedState::BodyLf,
                    b'\n' => return Poll::Ready(Ok(self.finish_chunk())),
                    _ => return Poll::Ready(Err(chunk_fault("Error reading chunk body."))),
                },

                ChunkedState::BodyLf => match next_byte!(src) {
                    b'\n' => return Poll::Ready(Ok(self.finish_chunk())),
                    _ => return Poll::Ready(Err(chunk_fault("Error reading chunk body."))),
                },
            }
        }
    }

    /// The size line is terminated; dispatch on the parsed size. `Some`
    /// means the zero-size final chunk was read.
    fn finish_size_line(&mut self) -> Option<ChunkEvent> {
        if !self.extensions.is_empty() {
            trace!(extensions = %String::from_utf8_lossy(&self.extensions), "ignoring chunk extensions");
        }
        if self.chunk_size == 0 {
            Some(ChunkEvent::Complete)
        } else {
            self.remaining = self.chunk_size;
            self.state = ChunkedState::Body;
            None
        }
    }

    fn finish_chunk(&mut self) -> ChunkEvent {
        trace!(len = self.chunk_size, "read chunk");
        self.state = ChunkedState::Start;
        ChunkEvent::Chunk(std::mem::take(&mut self.payload))
    }
}

fn chunk_fault(reason: &str) -> ParseError {
    ParseError::invalid_chunk(reason)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expect_chunk(decoder: &mut ChunkedDecoder, buffer: &mut BytesMut) -> Blob {
        match decoder.advance(buffer) {
            Poll::Ready(Ok(ChunkEvent::Chunk(blob))) => blob,
            other => panic!("expected chunk, got {other:?}"),
        }
    }

    fn expect_complete(decoder: &mut ChunkedDecoder, buffer: &mut BytesMut) {
        match decoder.advance(buffer) {
            Poll::Ready(Ok(ChunkEvent::Complete)) => {}
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[test]
    fn basic() {
        let mut buffer = BytesMut::from(&b"10\r\n1234567890abcdef\r\n0\r\n"[..]);
        let mut decoder = ChunkedDecoder::new(1024);

        let chunk = expect_chunk(&mut decoder, &mut buffer);
        assert_eq!(chunk, &b"1234567890abcdef"[..]);
        expect_complete(&mut decoder, &mut buffer);
    }

    #[test]
    fn multiple_chunks() {
        let mut buffer = BytesMut::from(&b"5\r\nhello\r\n7\r\n, world\r\n0\r\n"[..]);
        let mut decoder = ChunkedDecoder::new(1024);

        assert_eq!(expect_chunk(&mut decoder, &mut buffer), &b"hello"[..]);
        assert_eq!(expect_chunk(&mut decoder, &mut buffer), &b", world"[..]);
        expect_complete(&mut decoder, &mut buffer);
    }

    #[test]
    fn chunk_with_extensions() {
        let mut buffer = BytesMut::from(&b"5;chunk-ext=value\r\nhello\r\n0\r\n"[..]);
        let mut decoder = ChunkedDecoder::new(1024);

        assert_eq!(expect_chunk(&mut decoder, &mut buffer), &b"hello"[..]);
        expect_complete(&mut decoder, &mut buffer);
    }

    #[test]
    fn bare_lf_line_endings() {
        let mut buffer = BytesMut::from(&b"5\nhello\n0\n"[..]);
        let mut decoder = ChunkedDecoder::new(1024);

        assert_eq!(expect_chunk(&mut decoder, &mut buffer), &b"hello"[..]);
        expect_complete(&mut decoder, &mut buffer);
    }

    #[test]
    fn incomplete_chunk_resumes() {
        let mut buffer = BytesMut::from(&b"5\r\nhel"[..]);
        let mut decoder = ChunkedDecoder::new(1024);

        assert!(matches!(decoder.advance(&mut buffer), Poll::Pending));

        buffer.extend_from_slice(b"lo\r\n0\r\n");
        assert_eq!(expect_chunk(&mut decoder, &mut buffer), &b"hello"[..]);
        expect_complete(&mut decoder, &mut buffer);
    }

    #[test]
    fn invalid_chunk_size() {
        let mut buffer = BytesMut::from(&b"xyz\r\n"[..]);
        let mut decoder = ChunkedDecoder::new(1024);
        assert!(matches!(decoder.advance(&mut buffer), Poll::Ready(Err(_))));
    }

    #[test]
    fn size_overflow_is_rejected() {
        let mut buffer = BytesMut::from(&b"fffffffffffffffff\r\n"[..]);
        let mut decoder = ChunkedDecoder::new(1024);
        match decoder.advance(&mut buffer) {
            Poll::Ready(Err(ParseError::ChunkSizeOverflow)) => {}
            other => panic!("expected overflow fault, got {other:?}"),
        }
    }

    #[test]
    fn missing_crlf_after_payload() {
        let mut buffer = BytesMut::from(&b"5\r\nhelloBad"[..]);
        let mut decoder = ChunkedDecoder::new(1024);
        assert!(matches!(decoder.advance(&mut buffer), Poll::Ready(Err(_))));
    }

    #[test]
    fn large_chunk_spills_to_file() {
        let size = 64 * 1024;
        let mut data = format!("{size:x}\r\n").into_bytes();
        data.extend(std::iter::repeat(b'A').take(size));
        data.extend_from_slice(b"\r\n0\r\n");

        let mut buffer = BytesMut::from(&data[..]);
        let mut decoder = ChunkedDecoder::new(1024);

        let chunk = expect_chunk(&mut decoder, &mut buffer);
        assert!(chunk.is_on_disk());
        assert_eq!(chunk.checked_size().unwrap(), size as u64);
        expect_complete(&mut decoder, &mut buffer);
    }

    #[test]
    fn zero_size_chunk_completes() {
        let mut buffer = BytesMut::from(&b"0\r\n"[..]);
        let mut decoder = ChunkedDecoder::new(1024);
        expect_complete(&mut decoder, &mut buffer);
    }
}
