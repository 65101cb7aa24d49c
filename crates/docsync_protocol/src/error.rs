//! Error types for the protocol crate.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while encoding or decoding frames.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Failed to encode a frame.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode bytes into a frame.
    #[error("decoding failed: {message}")]
    DecodingFailed {
        /// Description of the decoding error.
        message: String,
    },

    /// The `msg` tag names no known message kind.
    #[error("unknown message kind: {kind}")]
    UnknownMessage {
        /// The unrecognized tag.
        kind: String,
    },

    /// A field required by the message kind is missing.
    #[error("{kind} message is missing field {field}")]
    MissingField {
        /// Message kind.
        kind: String,
        /// Name of the missing field.
        field: &'static str,
    },

    /// A frame exceeds the maximum length of a framed stream.
    #[error("frame of {length} bytes exceeds the limit of {limit}")]
    FrameTooLarge {
        /// Claimed frame length.
        length: u64,
        /// Maximum allowed length.
        limit: u64,
    },

    /// A batch holds more messages than `batchSize` can declare.
    #[error("batch of {len} messages exceeds the batchSize limit")]
    BatchTooLarge {
        /// Number of messages in the batch.
        len: usize,
    },

    /// I/O failure while reading or writing a frame stream.
    #[error("io error: {0}")]
    Io(String),
}

impl ProtocolError {
    /// Creates an encoding failed error.
    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }

    /// Creates a decoding failed error.
    pub fn decoding_failed(message: impl Into<String>) -> Self {
        Self::DecodingFailed {
            message: message.into(),
        }
    }

    /// Returns true if the frame was well-formed but named an unknown
    /// message kind.
    pub fn is_unknown_message(&self) -> bool {
        matches!(self, ProtocolError::UnknownMessage { .. })
    }
}

impl From<std::io::Error> for ProtocolError {
    fn from(err: std::io::Error) -> Self {
        ProtocolError::Io(err.to_string())
    }
}
