mod chunked_decoder;
mod fixed_decoder;

pub(crate) use chunked_decoder::ChunkEvent;
pub(crate) use chunked_decoder::ChunkedDecoder;
pub(crate) use fixed_decoder::FixedDecoder;
