//! The server role: bind, accept, and hand each connection to a session.

use std::net::IpAddr;
use std::os::fd::{AsRawFd, RawFd};
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::connection::ServerSession;
use crate::handler::{Handler, HelloWorld};
use crate::protocol::{Parameter, Parameters};

/// Role-level error surface. Configuration faults are recoverable with
/// [`Server::clear_error`] once the condition is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerErrorCode {
    NoError,
    ServerAlreadyRunning,
    StartFailed,
}

pub struct Server<H = HelloWorld> {
    address: String,
    port: u16,
    running: bool,
    error_code: ServerErrorCode,
    error_message: String,
    socket_handle: Option<RawFd>,
    params: Arc<Parameters>,
    handler: Arc<H>,
    cancel: CancellationToken,
    accept_task: Option<JoinHandle<()>>,
}

impl Server<HelloWorld> {
    /// A server answering every request with the default handler.
    pub fn new() -> Self {
        Self::with_handler(HelloWorld)
    }
}

impl Default for Server<HelloWorld> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> Server<H>
where
    H: Handler + 'static,
{
    pub fn with_handler(handler: H) -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 0,
            running: false,
            error_code: ServerErrorCode::NoError,
            error_message: String::new(),
            socket_handle: None,
            params: Arc::new(Parameters::new()),
            handler: Arc::new(handler),
            cancel: CancellationToken::new(),
            accept_task: None,
        }
    }

    /// Bind and start accepting. Failures are reported through the error
    /// surface, not a return value; starting an already-running server is
    /// a no-op.
    pub async fn start(&mut self) -> &mut Self {
        if self.running {
            return self;
        }

        let ip: IpAddr = match self.address.parse() {
            Ok(ip) => ip,
            Err(_) => {
                return self.fail(format!(
                    "Error parsing server listen address: `{}`",
                    self.address
                ));
            }
        };

        let listener = match TcpListener::bind((ip, self.port)).await {
            Ok(listener) => listener,
            Err(e) => return self.fail(format!("Failed to bind to socket: {e}")),
        };

        // Port 0 resolves to the kernel-assigned port.
        match listener.local_addr() {
            Ok(addr) => self.port = addr.port(),
            Err(e) => return self.fail(format!("Could not get the socket address: {e}")),
        }
        self.socket_handle = Some(listener.as_raw_fd());

        info!(address = %self.address, port = self.port, "server listening");

        self.cancel = CancellationToken::new();
        let cancel = self.cancel.clone();
        let handler = self.handler.clone();
        let params = self.params.clone();
        self.accept_task = Some(tokio::spawn(accept_loop(listener, handler, params, cancel)));
        self.running = true;
        self
    }

    /// Stop accepting and wind down sessions.
    pub async fn stop(&mut self) -> &mut Self {
        if let Some(task) = self.accept_task.take() {
            self.cancel.cancel();
            let _ = task.await;
            self.running = false;
            self.socket_handle = None;
        }
        self
    }

    pub fn set_address(&mut self, address: impl Into<String>) -> &mut Self {
        if self.running {
            self.error_code = ServerErrorCode::ServerAlreadyRunning;
            self.error_message =
                "Could not set server listening address because server is already running."
                    .to_string();
        } else {
            self.address = address.into();
        }
        self
    }

    pub fn set_port(&mut self, port: u16) -> &mut Self {
        if self.running {
            self.error_code = ServerErrorCode::ServerAlreadyRunning;
            self.error_message =
                "Could not set port of server because it is already running.".to_string();
        } else {
            self.port = port;
        }
        self
    }

    pub fn set_parameter(&self, parameter: Parameter, value: u64) -> &Self {
        self.params.set(parameter, value);
        self
    }

    pub fn clear_error(&mut self) -> &mut Self {
        self.error_code = ServerErrorCode::NoError;
        self.error_message.clear();
        self
    }

    pub fn error_code(&self) -> ServerErrorCode {
        self.error_code
    }

    pub fn error_message(&self) -> &str {
        &self.error_message
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn socket_handle(&self) -> Option<RawFd> {
        self.socket_handle
    }

    fn fail(&mut self, message: String) -> &mut Self {
        error!("{message}");
        self.error_code = ServerErrorCode::StartFailed;
        self.error_message = message;
        self
    }
}

impl<H> Drop for Server<H> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn accept_loop<H>(
    listener: TcpListener,
    handler: Arc<H>,
    params: Arc<Parameters>,
    cancel: CancellationToken,
) where
    H: Handler + 'static,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => {
                let (stream, remote) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(cause = %e, "failed to accept");
                        continue;
                    }
                };

                info!(%remote, "accepted connection");
                let (reader, writer) = stream.into_split();
                let session = ServerSession::new(reader, writer, handler.clone(), params.clone());
                let session_cancel = cancel.child_token();
                tokio::spawn(async move {
                    match session.drive(session_cancel).await {
                        Ok(()) => info!("connection finished"),
                        Err(e) => error!(cause = %e, "connection failed"),
                    }
                });
            }
        }
    }
}
