//! The client side of one TCP connection.
//!
//! Requests arrive from the client dispatcher over a queue, are written
//! in enqueue order, and responses are correlated back to them by
//! position: the nth response on the wire answers the nth request sent.
//! Caller-supplied response messages are registered with the decoder so
//! they are populated in place and their ready signals fire as content
//! arrives (once per chunk for chunked transports, then once in finished
//! mode).

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::Decoder;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::codec::MessageDecoder;
use crate::protocol::{Kind, Parameter, Parameters, SharedMessage};

use super::message_writer::MessageWriter;

/// One request/response pair in flight on a session.
pub struct Exchange {
    pub request: SharedMessage,
    pub response: SharedMessage,
}

pub struct ClientSession<R, W> {
    reader: R,
    writer: MessageWriter<W>,
    decoder: MessageDecoder,
    queue: mpsc::UnboundedReceiver<Exchange>,

    read_buffer: BytesMut,
    max_read: usize,

    request_sequence: u64,
    read_sequence: u64,
    inflight: HashMap<u64, Exchange>,
    to_write: VecDeque<u64>,

    finished: bool,
    queue_closed: bool,
}

impl<R, W> ClientSession<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Build a session over an established connection. `params` is the
    /// owning client's parameter link; the session gets its own child
    /// link.
    pub fn new(reader: R, writer: W, queue: mpsc::UnboundedReceiver<Exchange>, params: Arc<Parameters>) -> Self {
        let session_params = Arc::new(Parameters::with_parent(params));
        let max_read = session_params.get(Parameter::MaxBufferSize) as usize;
        Self {
            reader,
            writer: MessageWriter::with_capacity(writer, max_read),
            decoder: MessageDecoder::new(Kind::Response, session_params),
            queue,
            read_buffer: BytesMut::with_capacity(max_read),
            max_read,
            request_sequence: 0,
            read_sequence: 0,
            inflight: HashMap::new(),
            to_write: VecDeque::new(),
            finished: false,
            queue_closed: false,
        }
    }

    /// Run the session until the server closes the connection, a hard
    /// error occurs, or the token fires. On exit, every response still
    /// in flight has its ready signal released in the non-finished state
    /// so callers observe the failure.
    pub async fn drive(mut self, cancel: CancellationToken) {
        let mut scratch = vec![0u8; self.max_read];

        loop {
            self.write().await;

            if self.finished || (self.queue_closed && self.inflight.is_empty()) {
                break;
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("session cancelled");
                    break;
                }
                enqueued = self.queue.recv(), if !self.queue_closed => {
                    match enqueued {
                        Some(exchange) => self.enqueue(exchange),
                        None => self.queue_closed = true,
                    }
                }
                received = self.reader.read(&mut scratch) => {
                    let received = received.map(|n| &scratch[..n]);
                    self.read(received);
                }
            }
        }

        self.release_inflight();
    }

    /// Accept a new exchange: assign the next sequence id, register the
    /// caller's response with the decoder, and queue the request for
    /// writing.
    fn enqueue(&mut self, exchange: Exchange) {
        let sequence = self.request_sequence;
        self.request_sequence += 1;

        self.decoder.register_message(sequence, exchange.response.clone());
        self.inflight.insert(sequence, exchange);
        self.to_write.push_back(sequence);
    }

    /// Feed one received block through the decoder; each completed
    /// response closes out the oldest in-flight exchange.
    fn read(&mut self, received: std::io::Result<&[u8]>) {
        let block = match received {
            Ok(block) if block.is_empty() => {
                info!("connection closed by server");
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
        while let Ok(Some(response)) = self.decoder.decode(&mut self.read_buffer) {
            // The registered caller message was populated in place and
            // signaled by the decoder; only the correlation bookkeeping
            // remains. Matching is positional: oldest outstanding first.
            debug_assert_eq!(response.lock().id(), self.read_sequence);
            drop(response);

            self.inflight.remove(&self.read_sequence);
            self.read_sequence += 1;
        }
    }

    /// Render and flush queued requests in enqueue order.
    async fn write(&mut self) {
        while let Some(&sequence) = self.to_write.front() {
            let Some(exchange) = self.inflight.get(&sequence) else {
                self.to_write.pop_front();
                continue;
            };

            let rendered = {
                let mut request = exchange.request.lock();
                self.writer.write(&mut request)
            };
            if let Err(e) = rendered {
                // Unrenderable transport: fail this exchange only and
                // keep the pipeline moving.
                error!(cause = %e, sequence, "dropping unrenderable request");
                if let Some(exchange) = self.inflight.remove(&sequence) {
                    let reason = e.to_string();
                    exchange.response.lock().set_reason(reason);
                    exchange.response.set_ready(false);
                }
                self.to_write.pop_front();
                continue;
            }

            if let Err(e) = self.writer.flush().await {
                error!(cause = %e, "write failed, closing session");
                self.finished = true;
                return;
            }

            self.to_write.pop_front();
        }
    }

    /// Signal failure to every caller still waiting on a response.
    fn release_inflight(&mut self) {
        // Requests still sitting in the queue can never be served here.
        while let Ok(exchange) = self.queue.try_recv() {
            self.inflight.insert(self.request_sequence, exchange);
            self.request_sequence += 1;
        }

        for (_, exchange) in self.inflight.drain() {
            exchange.response.set_ready(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Transport;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    fn exchange() -> (Exchange, SharedMessage) {
        let request = SharedMessage::new(Kind::Request);
        request.lock().set_target("/foo").set_domain("127.0.0.1").set_port(80);
        let response = SharedMessage::new(Kind::Response);
        (Exchange { request, response: response.clone() }, response)
    }

    #[tokio::test]
    async fn correlates_response_to_request() {
        let (client, server) = duplex(16 * 1024);
        let (read_half, write_half) = tokio::io::split(client);
        let (tx, rx) = mpsc::unbounded_channel();
        let session = ClientSession::new(read_half, write_half, rx, Arc::new(Parameters::new()));
        let task = tokio::spawn(session.drive(CancellationToken::new()));

        let (ex, response) = exchange();
        tx.send(ex).unwrap();

        // Read the request off the "server" end and answer it.
        let (mut server_read, mut server_write) = tokio::io::split(server);
        let mut request_bytes = vec![0u8; 1024];
        let n = server_read.read(&mut request_bytes).await.unwrap();
        let request_text = String::from_utf8_lossy(&request_bytes[..n]).into_owned();
        assert!(request_text.starts_with("GET /foo HTTP/1.1\r\n"), "got: {request_text}");

        server_write
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 12\r\n\r\nHello World!")
            .await
            .unwrap();

        response.ready().await;
        assert!(response.is_finished());
        {
            let message = response.lock();
            assert_eq!(message.status_code(), 200);
            assert_eq!(message.transport(), Transport::Fixed);
            assert_eq!(message.content_length(), 12);
            assert_eq!(*message.body(), b"Hello World!"[..]);
        }

        drop(tx);
        server_write.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn pipelined_responses_match_enqueue_order() {
        let (client, server) = duplex(16 * 1024);
        let (read_half, write_half) = tokio::io::split(client);
        let (tx, rx) = mpsc::unbounded_channel();
        let session = ClientSession::new(read_half, write_half, rx, Arc::new(Parameters::new()));
        let task = tokio::spawn(session.drive(CancellationToken::new()));

        let (first_ex, first) = exchange();
        let (second_ex, second) = exchange();
        second_ex.request.lock().set_target("/bar");
        tx.send(first_ex).unwrap();
        tx.send(second_ex).unwrap();

        let (mut server_read, mut server_write) = tokio::io::split(server);
        let mut seen = Vec::new();
        while !String::from_utf8_lossy(&seen).contains("/bar") {
            let mut chunk = vec![0u8; 1024];
            let n = server_read.read(&mut chunk).await.unwrap();
            seen.extend_from_slice(&chunk[..n]);
        }

        // Answer both, fragmented across writes.
        let wire = b"HTTP/1.1 200 OK\r\nContent-Length: 1\r\n\r\naHTTP/1.1 404 Not Found\r\nContent-Length: 1\r\n\r\nb".to_vec();
        for part in wire.chunks(7) {
            server_write.write_all(part).await.unwrap();
        }

        first.ready().await;
        second.ready().await;
        assert_eq!(first.lock().status_code(), 200);
        assert_eq!(*first.lock().body(), b"a"[..]);
        assert_eq!(second.lock().status_code(), 404);
        assert_eq!(*second.lock().body(), b"b"[..]);

        drop(tx);
        server_write.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn disconnect_releases_pending_signals_unfinished() {
        let (client, server) = duplex(16 * 1024);
        let (read_half, write_half) = tokio::io::split(client);
        let (tx, rx) = mpsc::unbounded_channel();
        let session = ClientSession::new(read_half, write_half, rx, Arc::new(Parameters::new()));
        let task = tokio::spawn(session.drive(CancellationToken::new()));

        let (ex, response) = exchange();
        tx.send(ex).unwrap();

        // Server goes away without answering.
        drop(server);

        response.ready().await;
        assert!(!response.is_finished());

        drop(tx);
        task.await.unwrap();
    }
}
