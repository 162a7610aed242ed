//! Error types for protocol handling.
//!
//! Protocol-level faults (malformed start line, bad field syntax, chunk
//! size overflow, ...) are not surfaced as `Err` at the decoder boundary:
//! they are recorded on the in-flight [`Message`](super::Message) as a
//! status code plus description, and parsing continues with a fresh
//! message. [`ParseError`] is the internal currency the sub-decoders use
//! to report those faults upward, and the I/O channel for resource
//! failures during body accumulation.

use std::io;
use thiserror::Error;

/// Top-level error for connection processing.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("receive error: {source}")]
    ReceiveError {
        #[from]
        source: ParseError,
    },

    #[error("send error: {source}")]
    SendError {
        #[from]
        source: SendError,
    },
}

/// Faults raised while decoding the inbound byte stream.
#[derive(Error, Debug)]
pub enum ParseError {
    /// Malformed request line or status line.
    #[error("{reason}")]
    InvalidStartLine { reason: String },

    /// Method token not in the recognized set.
    #[error("Unrecognized method")]
    UnrecognizedMethod,

    /// Malformed field line in the header or trailer section.
    #[error("{reason}")]
    InvalidFieldLine { reason: String },

    /// Content-Length value that is not a decimal number.
    #[error("Invalid Content-Length")]
    InvalidContentLength,

    /// A chunk-size digit that would overflow the accumulator.
    #[error("Chunk size too large.")]
    ChunkSizeOverflow,

    /// Malformed chunk framing.
    #[error("{reason}")]
    InvalidChunk { reason: String },

    /// Body blob I/O failure while accumulating a body or chunk.
    #[error("Insufficient Storage")]
    InsufficientStorage {
        #[source]
        source: io::Error,
    },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn invalid_start_line<S: ToString>(reason: S) -> Self {
        Self::InvalidStartLine { reason: reason.to_string() }
    }

    pub fn invalid_field_line<S: ToString>(reason: S) -> Self {
        Self::InvalidFieldLine { reason: reason.to_string() }
    }

    pub fn invalid_chunk<S: ToString>(reason: S) -> Self {
        Self::InvalidChunk { reason: reason.to_string() }
    }

    pub fn insufficient_storage(source: io::Error) -> Self {
        Self::InsufficientStorage { source }
    }

    /// The status code attached to the message carrying this fault.
    pub fn status(&self) -> u16 {
        match self {
            Self::InvalidStartLine { .. }
            | Self::InvalidFieldLine { .. }
            | Self::InvalidContentLength
            | Self::ChunkSizeOverflow
            | Self::InvalidChunk { .. } => 400,
            Self::UnrecognizedMethod => 501,
            Self::InsufficientStorage { .. } => 507,
            // Stray I/O errors in a body path also read as storage faults.
            Self::Io { .. } => 507,
        }
    }
}

/// Faults raised while rendering and sending the outbound stream.
#[derive(Error, Debug)]
pub enum SendError {
    /// The message declared a transport the writer does not implement.
    #[error("unsupported transport: {transport}")]
    UnsupportedTransport { transport: &'static str },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

/// Fault from the closed-set parameter surface.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParameterError {
    #[error("parameter not found: {name}")]
    ParameterNotFound { name: &'static str },
}
