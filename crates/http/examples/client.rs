//! A client sending one request to the server example.
//!
//! Run `cargo run --example server` first, then
//! `cargo run --example client`.

use swell_http::client::Client;
use swell_http::protocol::{Kind, SharedMessage};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().init();

    let mut client = Client::new();

    let request = SharedMessage::new(Kind::Request);
    request.lock().set_domain("127.0.0.1").set_port(8080).set_target("/hello");

    let response = client.send_request(request);
    response.ready().await;

    if response.is_finished() {
        println!("{}", *response.lock());
        println!("body: {}", response.lock().body());
    } else {
        eprintln!("request failed: {}", response.lock().reason());
    }

    client.stop().await;
}
