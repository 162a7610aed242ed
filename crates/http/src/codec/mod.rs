pub(crate) mod body;
mod field_decoder;
mod head_decoder;
mod head_encoder;
mod message_decoder;
mod message_encoder;

pub use message_decoder::MessageDecoder;
pub use message_encoder::MessageEncoder;
pub use message_encoder::WriteState;
