use bytes::BytesMut;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::codec::MessageEncoder;
use crate::protocol::{Message, SendError};

/// Buffers rendered messages and pushes them onto the socket.
///
/// Each message is rendered completely into the buffer by its own
/// [`MessageEncoder`] walk; `flush` then drains the buffer with
/// `write_all`, which absorbs partial socket writes.
#[derive(Debug)]
pub struct MessageWriter<W> {
    writer: W,
    buffer: BytesMut,
}

impl<W> MessageWriter<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn with_capacity(writer: W, buffer_size: usize) -> Self {
        Self { writer, buffer: BytesMut::with_capacity(buffer_size) }
    }

    #[inline]
    pub fn write(&mut self, message: &mut Message) -> Result<(), SendError> {
        MessageEncoder::new().encode(message, &mut self.buffer)
    }

    #[inline]
    pub async fn flush(&mut self) -> Result<(), SendError> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        self.writer.write_all(self.buffer.as_ref()).await?;
        self.buffer.clear();
        Ok(self.writer.flush().await?)
    }
}
