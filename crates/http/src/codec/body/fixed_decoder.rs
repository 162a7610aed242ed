//! Decoder for bodies governed by `Content-Length`
//! (RFC 9112 Section 6.2).

use std::task::Poll;

use bytes::BytesMut;

use crate::protocol::{Blob, ParseError};

/// Reads exactly `content_length` bytes into a [`Blob`], spilling to a
/// temp file once the in-memory accumulation crosses the configured
/// limit.
#[derive(Debug)]
pub(crate) struct FixedDecoder {
    remaining: u64,
    body: Blob,
    mem_limit: u64,
}

impl FixedDecoder {
    pub(crate) fn new(content_length: u64, mem_limit: u64) -> Self {
        Self { remaining: content_length, body: Blob::new(), mem_limit }
    }

    /// Consume up to `remaining` bytes; yields the completed body blob.
    pub(crate) fn advance(&mut self, src: &mut BytesMut) -> Poll<Result<Blob, ParseError>> {
        while self.remaining > 0 {
            if src.is_empty() {
                return Poll::Pending;
            }

            let take = self.remaining.min(src.len() as u64) as usize;
            let data = src.split_to(take);
            if let Err(e) = accumulate(&mut self.body, &data, self.mem_limit) {
                return Poll::Ready(Err(e));
            }
            self.remaining -= take as u64;
        }

        Poll::Ready(Ok(std::mem::take(&mut self.body)))
    }
}

/// Append to a body blob, converting to the on-disk variant when the
/// in-memory size crosses `mem_limit`. I/O failures here read as
/// insufficient storage (RFC 4918 Section 11.5).
pub(super) fn accumulate(body: &mut Blob, data: &[u8], mem_limit: u64) -> Result<(), ParseError> {
    body.append(data).map_err(ParseError::insufficient_storage)?;
    if body.is_in_memory() && body.size() > mem_limit {
        body.convert_to_file().map_err(ParseError::insufficient_storage)?;
    }
    Ok(())
}
