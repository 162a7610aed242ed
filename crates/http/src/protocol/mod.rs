mod blob;
pub use blob::Blob;

mod fields;
pub use fields::FieldMap;

mod message;
pub use message::Kind;
pub use message::Message;
pub use message::Method;
pub use message::Transport;

mod signal;
pub use signal::SharedMessage;

mod error;
pub use error::HttpError;
pub use error::ParameterError;
pub use error::ParseError;
pub use error::SendError;

mod param;
pub use param::Parameter;
pub use param::Parameters;

pub mod tokens;
