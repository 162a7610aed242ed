//! A server answering every request from a closure handler.
//!
//! Run with `cargo run --example server`, then point `curl` or the
//! client example at port 8080.

use swell_http::handler::make_handler;
use swell_http::protocol::{Blob, Kind, Message};
use swell_http::server::Server;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().init();

    let handler = make_handler(|request: Message| async move {
        let mut response = Message::new(Kind::Response);
        response.set_status_code(200).set_reason("OK");
        response.set_body(Blob::from_bytes(format!("you asked for {}\n", request.target())));
        response
    });

    let mut server = Server::with_handler(handler);
    server.set_port(8080);
    server.start().await;
    if !server.is_running() {
        eprintln!("start failed: {}", server.error_message());
        return;
    }
    println!("listening on {}:{}", server.address(), server.port());

    tokio::signal::ctrl_c().await.expect("install ctrl-c handler");
    server.stop().await;
}
