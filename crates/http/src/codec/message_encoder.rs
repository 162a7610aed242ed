//! Encoder for whole outbound messages.
//!
//! The write phase is a sum type walked once per message: header, then
//! either the fixed body or the chunk sequence with its terminating
//! zero-size chunk and trailer section. Messages are fully assembled
//! before they enter the pipeline, so a single walk renders the complete
//! wire form into the output buffer; partial socket writes are the
//! writer's concern, not the encoder's.

use std::io;

use bytes::{BufMut, BytesMut};

use crate::protocol::{Message, SendError, Transport};

use super::head_encoder::HeadEncoder;

/// Progress of the per-message write machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteState {
    New,
    SendHeader,
    SendFixed,
    SendChunkHeader,
    SendChunkBody,
    Finished,
    Error,
}

pub struct MessageEncoder {
    state: WriteState,
    /// Index of the next chunk to render.
    chunk_index: usize,
}

impl Default for MessageEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageEncoder {
    pub fn new() -> Self {
        Self { state: WriteState::New, chunk_index: 0 }
    }

    pub fn is_finished(&self) -> bool {
        self.state == WriteState::Finished
    }

    /// Render `message` into `dst`, walking the write states to
    /// completion. On error the machine parks in `WriteState::Error`.
    pub fn encode(&mut self, message: &mut Message, dst: &mut BytesMut) -> Result<(), SendError> {
        match self.run(message, dst) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.state = WriteState::Error;
                Err(e)
            }
        }
    }

    fn run(&mut self, message: &mut Message, dst: &mut BytesMut) -> Result<(), SendError> {
        loop {
            match self.state {
                WriteState::New => {
                    self.state = match message.transport() {
                        Transport::Undeclared | Transport::Fixed | Transport::Chunked => {
                            WriteState::SendHeader
                        }
                        transport @ (Transport::Multipart | Transport::Stream) => {
                            return Err(SendError::UnsupportedTransport {
                                transport: transport.as_str(),
                            });
                        }
                    };
                }

                WriteState::SendHeader => {
                    HeadEncoder::encode(message, dst)?;
                    self.state = match message.transport() {
                        Transport::Chunked => WriteState::SendChunkHeader,
                        _ => WriteState::SendFixed,
                    };
                }

                WriteState::SendFixed => {
                    message.body().write_to(dst)?;
                    self.state = WriteState::Finished;
                }

                WriteState::SendChunkHeader => {
                    if self.chunk_index < message.chunks().len() {
                        let size = message.chunks()[self.chunk_index].content_length();
                        dst.put_slice(format!("{size:X}\r\n").as_bytes());
                        self.state = WriteState::SendChunkBody;
                    } else {
                        // Last chunk, trailer section, final blank line.
                        dst.put_slice(b"0\r\n");
                        render_trailers(message, dst);
                        dst.put_slice(b"\r\n");
                        self.state = WriteState::Finished;
                    }
                }

                WriteState::SendChunkBody => {
                    message.chunks()[self.chunk_index].body().write_to(dst)?;
                    dst.put_slice(b"\r\n");
                    self.chunk_index += 1;
                    self.state = WriteState::SendChunkHeader;
                }

                WriteState::Finished => return Ok(()),

                // An encoder that already failed must not be reused.
                WriteState::Error => {
                    return Err(io::Error::from(io::ErrorKind::InvalidInput).into());
                }
            }
        }
    }
}

fn render_trailers(message: &Message, dst: &mut BytesMut) {
    for (name, values) in message.trailer_fields().iter() {
        for value in values {
            dst.put_slice(name.as_bytes());
            dst.put_slice(b": ");
            dst.put_slice(value);
            dst.put_slice(b"\r\n");
        }
    }
}
