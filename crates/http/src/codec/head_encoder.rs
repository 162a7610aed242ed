//! Encoder for the start line and header block.

use bytes::{BufMut, BytesMut};

use crate::protocol::{Message, SendError, Transport};

pub(crate) struct HeadEncoder;

impl HeadEncoder {
    /// Render the start line, the message's field lines, the framing
    /// field matching the transport, and the terminating blank line.
    /// Marks the message's header as sent.
    pub(crate) fn encode(message: &mut Message, dst: &mut BytesMut) -> Result<(), SendError> {
        dst.reserve(256);
        let header = message.render_header();
        dst.put_slice(&header);

        match message.transport() {
            // An undeclared outbound transport is written as fixed with
            // its current content length (zero unless a body was set).
            Transport::Undeclared | Transport::Fixed => {
                dst.put_slice(b"Content-Length: ");
                dst.put_slice(message.content_length().to_string().as_bytes());
                dst.put_slice(b"\r\n\r\n");
            }
            Transport::Chunked => {
                dst.put_slice(b"Transfer-Encoding: chunked\r\n\r\n");
            }
            transport @ (Transport::Multipart | Transport::Stream) => {
                return Err(SendError::UnsupportedTransport { transport: transport.as_str() });
            }
        }

        message.set_header_sent();
        Ok(())
    }
}
