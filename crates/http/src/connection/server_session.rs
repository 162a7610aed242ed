//! The server side of one TCP connection.
//!
//! A session owns the socket halves, the request decoder, and the
//! response writer, and is driven by exactly one task: reads and writes
//! are interleaved cooperatively in [`ServerSession::drive`], so the
//! read/write entry points never run concurrently for a connection.
//!
//! Pipelining: every parsed request is paired with a handler-produced
//! response under the next request sequence number; responses are written
//! strictly in that order while later requests may still be arriving.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio_util::codec::Decoder;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::codec::MessageDecoder;
use crate::handler::Handler;
use crate::protocol::{HttpError, Kind, Message, Parameter, Parameters};

use super::message_writer::MessageWriter;

pub struct ServerSession<R, W, H> {
    reader: R,
    writer: MessageWriter<W>,
    decoder: MessageDecoder,
    handler: Arc<H>,

    read_buffer: BytesMut,
    max_read: usize,

    request_sequence: u64,
    pipeline: VecDeque<u64>,
    responses: HashMap<u64, Message>,

    finished: bool,
    /// An errored request was answered; close once the reply is flushed.
    close_after_write: bool,
}

impl<R, W, H> ServerSession<R, W, H>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    H: Handler,
{
    /// Build a session over an established connection. `params` is the
    /// owning server's parameter link; the session gets its own child
    /// link so lookups resolve session, then role, then defaults.
    pub fn new(reader: R, writer: W, handler: Arc<H>, params: Arc<Parameters>) -> Self {
        let session_params = Arc::new(Parameters::with_parent(params));
        let max_read = session_params.get(Parameter::MaxBufferSize) as usize;
        Self {
            reader,
            writer: MessageWriter::with_capacity(writer, max_read),
            decoder: MessageDecoder::new(Kind::Request, session_params),
            handler,
            read_buffer: BytesMut::with_capacity(max_read),
            max_read,
            request_sequence: 0,
            pipeline: VecDeque::new(),
            responses: HashMap::new(),
            finished: false,
            close_after_write: false,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Serve the connection until the peer shuts down, a hard error
    /// occurs, or the token fires.
    pub async fn drive(mut self, cancel: CancellationToken) -> Result<(), HttpError> {
        let mut scratch = vec![0u8; self.max_read];

        loop {
            self.write().await?;

            if self.finished || self.close_after_write {
                break;
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("session cancelled");
                    break;
                }
                received = self.reader.read(&mut scratch) => {
                    let received = received.map(|n| &scratch[..n]);
                    self.read(received).await;
                }
            }
        }

        Ok(())
    }

    /// Feed one received block through the decoder and enqueue a
    /// response for every completed request.
    async fn read(&mut self, received: std::io::Result<&[u8]>) {
        let block = match received {
            Ok(block) if block.is_empty() => {
                // Orderly shutdown.
                info!("connection closed by peer");
                self.finished = true;
                return;
            }
            Ok(block) => block,
            Err(e) => {
                error!(cause = %e, "read failed, closing session");
                self.finished = true;
                return;
            }
        };

        self.read_buffer.extend_from_slice(block);
        while let Ok(Some(request)) = self.decoder.decode(&mut self.read_buffer) {
            let request = request.into_message();
            let sequence = self.request_sequence;
            self.request_sequence += 1;

            let response = if request.has_error() {
                debug!(status = request.status_code(), "answering errored request");
                self.close_after_write = true;
                let mut response = Message::new(Kind::Response);
                response.set_status_code(request.status_code()).set_reason(request.reason());
                response
            } else {
                self.handler.call(request).await
            };

            self.responses.insert(sequence, response);
            self.pipeline.push_back(sequence);

            if self.close_after_write {
                break;
            }
        }
    }

    /// Render and flush pending responses in pipeline order.
    async fn write(&mut self) -> Result<(), HttpError> {
        while let Some(&sequence) = self.pipeline.front() {
            let Some(mut response) = self.responses.remove(&sequence) else {
                self.pipeline.pop_front();
                continue;
            };

            if let Err(e) = self.writer.write(&mut response) {
                // An unrenderable transport skips the message; the
                // pipeline must not wedge behind it.
                error!(cause = %e, sequence, "dropping unrenderable response");
                self.pipeline.pop_front();
                continue;
            }

            if let Err(e) = self.writer.flush().await {
                error!(cause = %e, "write failed, closing session");
                self.finished = true;
                return Err(e.into());
            }

            self.pipeline.pop_front();
        }

        Ok(())
    }
}
