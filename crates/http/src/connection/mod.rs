mod client_session;
pub use client_session::ClientSession;
pub use client_session::Exchange;

mod server_session;
pub use server_session::ServerSession;

mod message_writer;
pub use message_writer::MessageWriter;
