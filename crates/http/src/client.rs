//! The client role: pool sessions per host and dispatch requests.
//!
//! Connections are keyed by `(domain, port)` with at most one live
//! session per host; pipelining happens over that single session. A
//! session is established lazily when a request is queued for a host
//! with no live session, and a finished session is replaced the same
//! way.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::connection::{ClientSession, Exchange};
use crate::protocol::{Kind, Parameter, Parameters, SharedMessage};

pub struct Client {
    tx: mpsc::UnboundedSender<Exchange>,
    cancel: CancellationToken,
    dispatcher: Option<JoinHandle<()>>,
    params: Arc<Parameters>,
    running: bool,
}

impl Client {
    /// Spawn the dispatcher. Must be called from within a tokio runtime.
    pub fn new() -> Self {
        let params = Arc::new(Parameters::new());
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = tokio::spawn(dispatch_loop(rx, params.clone(), cancel.clone()));
        Self { tx, cancel, dispatcher: Some(dispatcher), params, running: true }
    }

    /// Queue a request for the host named by its domain and port.
    ///
    /// The returned response message's ready signal is released when the
    /// response has been fully received, once per chunk for chunked
    /// responses, or when a transport error has been recorded on it.
    pub fn send_request(&self, request: SharedMessage) -> SharedMessage {
        let response = SharedMessage::new(Kind::Response);
        let exchange = Exchange { request, response: response.clone() };
        if self.tx.send(exchange).is_err() {
            response.lock().set_reason("client is not running");
            response.set_ready(false);
        }
        response
    }

    pub fn set_parameter(&self, parameter: Parameter, value: u64) -> &Self {
        self.params.set(parameter, value);
        self
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Stop the dispatcher and wind down sessions; callers still waiting
    /// observe their signals released in the non-finished state.
    pub async fn stop(&mut self) {
        if let Some(task) = self.dispatcher.take() {
            self.cancel.cancel();
            let _ = task.await;
            self.running = false;
        }
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// One live session for a `(domain, port)` key.
struct Host {
    queue: mpsc::UnboundedSender<Exchange>,
    task: JoinHandle<()>,
}

async fn dispatch_loop(
    mut rx: mpsc::UnboundedReceiver<Exchange>,
    params: Arc<Parameters>,
    cancel: CancellationToken,
) {
    let mut hosts: HashMap<(String, u16), Host> = HashMap::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = rx.recv() => {
                let Some(exchange) = received else { break };
                dispatch(&mut hosts, exchange, &params, &cancel).await;
            }
        }
    }

    debug!("client dispatcher stopped");
}

async fn dispatch(
    hosts: &mut HashMap<(String, u16), Host>,
    exchange: Exchange,
    params: &Arc<Parameters>,
    cancel: &CancellationToken,
) {
    let key = {
        let request = exchange.request.lock();
        (request.domain().to_string(), request.port())
    };

    // A finished session is pruned so the next request reconnects.
    if hosts.get(&key).map_or(false, |host| host.task.is_finished()) {
        hosts.remove(&key);
    }

    if !hosts.contains_key(&key) {
        let stream = match TcpStream::connect((key.0.as_str(), key.1)).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(domain = %key.0, port = key.1, cause = %e, "connect failed");
                exchange.response.lock().set_reason(format!("Connection Failed: {e}"));
                exchange.response.set_ready(false);
                return;
            }
        };

        info!(domain = %key.0, port = key.1, "client session open");
        let (reader, writer) = stream.into_split();
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let session = ClientSession::new(reader, writer, queue_rx, params.clone());
        let task = tokio::spawn(session.drive(cancel.child_token()));
        hosts.insert(key.clone(), Host { queue: queue_tx, task });
    }

    if let Some(host) = hosts.get(&key) {
        if let Err(mpsc::error::SendError(exchange)) = host.queue.send(exchange) {
            // The session died between the liveness check and the send.
            exchange.response.lock().set_reason("connection lost");
            exchange.response.set_ready(false);
            hosts.remove(&key);
        }
    }
}
