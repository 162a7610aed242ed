//! End-to-end tests: a real server and client talking over loopback TCP.

use swell_http::client::Client;
use swell_http::handler::make_handler;
use swell_http::protocol::{Blob, Kind, Message, Parameter, SharedMessage, Transport};
use swell_http::server::{Server, ServerErrorCode};
use tracing_subscriber::FmtSubscriber;

fn init_logging() {
    let subscriber = FmtSubscriber::builder().with_max_level(tracing::Level::WARN).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn request_to(port: u16, target: &str) -> SharedMessage {
    let request = SharedMessage::new(Kind::Request);
    request.lock().set_domain("127.0.0.1").set_port(port).set_target(target);
    request
}

#[tokio::test]
async fn simple_fixed_response() {
    init_logging();
    let mut server = Server::new();
    server.start().await;
    assert!(server.is_running());

    let mut client = Client::new();
    let response = client.send_request(request_to(server.port(), "/foo"));
    response.ready().await;

    assert!(response.is_finished());
    {
        let message = response.lock();
        assert_eq!(message.status_code(), 200);
        assert_eq!(message.transport(), Transport::Fixed);
        assert_eq!(message.content_length(), 12);
        assert!(message.body().is_in_memory());
        assert_eq!(*message.body(), b"Hello World!"[..]);
    }

    client.stop().await;
    server.stop().await;
}

#[tokio::test]
async fn body_spills_to_file_past_limit() {
    init_logging();
    let mut server = Server::new();
    server.start().await;

    let mut client = Client::new();
    // The response body is 12 bytes; a 10-byte budget forces spillover.
    client.set_parameter(Parameter::MemChunkSizeLimit, 10);

    let response = client.send_request(request_to(server.port(), "/foo"));
    response.ready().await;

    assert!(response.is_finished());
    {
        let message = response.lock();
        assert_eq!(message.transport(), Transport::Fixed);
        assert_eq!(message.content_length(), 12);
        assert!(message.body().is_on_disk());
        assert_eq!(message.body().checked_size().unwrap(), 12);
        assert_eq!(*message.body(), b"Hello World!"[..]);
    }

    client.stop().await;
    server.stop().await;
}

#[tokio::test]
async fn pipelined_requests_on_one_session() {
    let handler = make_handler(|request: Message| async move {
        let mut response = Message::new(Kind::Response);
        response.set_status_code(200).set_reason("OK");
        response.set_body(Blob::from_bytes(request.target().as_bytes()));
        response
    });
    let mut server = Server::with_handler(handler);
    server.start().await;

    let mut client = Client::new();
    let targets = ["/one", "/two", "/three"];
    let responses: Vec<_> = targets
        .iter()
        .map(|target| client.send_request(request_to(server.port(), target)))
        .collect();

    for (response, target) in responses.iter().zip(targets) {
        response.ready().await;
        assert!(response.is_finished());
        assert_eq!(*response.lock().body(), target.as_bytes()[..]);
    }

    client.stop().await;
    server.stop().await;
}

#[tokio::test]
async fn chunked_response_end_to_end() {
    let handler = make_handler(|_request: Message| async move {
        let mut response = Message::new(Kind::Response);
        response.set_status_code(200).set_reason("OK");
        response.add_chunk(Message::chunk(Blob::from_bytes(b"hello")));
        response.add_chunk(Message::chunk(Blob::from_bytes(b" world")));
        response.add_trailer_field_value("X-Trace", "t1");
        response
    });
    let mut server = Server::with_handler(handler);
    server.start().await;

    let mut client = Client::new();
    let response = client.send_request(request_to(server.port(), "/stream"));

    // Chunked messages release the signal per chunk; wait for the
    // terminal release.
    loop {
        response.ready().await;
        if response.is_finished() {
            break;
        }
    }

    {
        let message = response.lock();
        assert_eq!(message.transport(), Transport::Chunked);
        assert_eq!(message.chunks().len(), 2);
        assert_eq!(*message.chunks()[0].body(), b"hello"[..]);
        assert_eq!(*message.chunks()[1].body(), b" world"[..]);
        assert_eq!(message.trailer_fields().first("x-trace").unwrap(), "t1");
    }

    client.stop().await;
    server.stop().await;
}

#[tokio::test]
async fn request_body_reaches_the_handler() {
    let handler = make_handler(|request: Message| async move {
        let mut response = Message::new(Kind::Response);
        response.set_status_code(200).set_reason("OK");
        let body = request.body().contents().unwrap_or_default();
        response.set_body(Blob::from_bytes(&body));
        response
    });
    let mut server = Server::with_handler(handler);
    server.start().await;

    let mut client = Client::new();
    let request = request_to(server.port(), "/echo");
    request.lock().set_method(swell_http::protocol::Method::Post);
    request.lock().set_body(Blob::from_bytes(b"ping"));

    let response = client.send_request(request);
    response.ready().await;

    assert!(response.is_finished());
    assert_eq!(*response.lock().body(), b"ping"[..]);

    client.stop().await;
    server.stop().await;
}

#[tokio::test]
async fn server_lifecycle_and_error_surface() {
    let mut server = Server::new();
    assert_eq!(server.address(), "127.0.0.1");
    assert_eq!(server.port(), 0);
    assert_eq!(server.error_code(), ServerErrorCode::NoError);
    assert_eq!(server.error_message(), "");
    assert!(!server.is_running());
    assert!(server.socket_handle().is_none());

    server.start().await;
    assert!(server.is_running());
    assert!(server.socket_handle().is_some());
    let port = server.port();
    assert_ne!(port, 0);

    // Starting an already-running server is not an error.
    server.start().await;
    assert_eq!(server.error_code(), ServerErrorCode::NoError);

    // Reconfiguration is rejected while running.
    server.set_address("0.0.0.0");
    assert_eq!(server.address(), "127.0.0.1");
    assert_eq!(server.error_code(), ServerErrorCode::ServerAlreadyRunning);
    assert_ne!(server.error_message(), "");
    server.clear_error();
    assert_eq!(server.error_code(), ServerErrorCode::NoError);
    assert_eq!(server.error_message(), "");

    server.set_port(80);
    assert_eq!(server.port(), port);
    assert_eq!(server.error_code(), ServerErrorCode::ServerAlreadyRunning);
    server.clear_error();

    server.stop().await;
    assert!(!server.is_running());

    // Reconfiguration works once stopped.
    server.set_address("0.0.0.0");
    assert_eq!(server.address(), "0.0.0.0");
    assert_eq!(server.error_code(), ServerErrorCode::NoError);
    server.set_address("127.0.0.1");
    server.set_port(0);

    server.start().await;
    assert!(server.is_running());
    server.stop().await;
}

#[tokio::test]
async fn start_with_bad_address_reports_error() {
    let mut server = Server::new();
    server.set_address("not-an-address");
    server.start().await;

    assert!(!server.is_running());
    assert_eq!(server.error_code(), ServerErrorCode::StartFailed);
    assert!(server.error_message().contains("not-an-address"));

    server.clear_error();
    assert_eq!(server.error_code(), ServerErrorCode::NoError);
}

#[tokio::test]
async fn connect_failure_releases_signal_unfinished() {
    let mut client = Client::new();

    // Nothing listens here; the connect fails fast on loopback.
    let response = client.send_request(request_to(1, "/"));
    response.ready().await;

    assert!(!response.is_finished());
    assert!(response.lock().reason().starts_with("Connection Failed"));

    client.stop().await;
}

#[tokio::test]
async fn send_after_stop_releases_signal_unfinished() {
    let mut client = Client::new();
    client.stop().await;
    assert!(!client.is_running());

    let response = client.send_request(request_to(1, "/"));
    response.ready().await;
    assert!(!response.is_finished());
}
