//! Error types for the reconciliation engine.

use docsync_core::{CoreError, DocumentId};
use docsync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// A change message that contradicts the replica in strict mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolViolation {
    /// `added` for a document that already exists.
    AddExisting(DocumentId),
    /// `removed` for a document that does not exist.
    RemoveMissing(DocumentId),
    /// `changed` for a document that does not exist.
    ChangeMissing(DocumentId),
}

impl ProtocolViolation {
    /// Returns the document the violation concerns.
    pub fn id(&self) -> &DocumentId {
        match self {
            ProtocolViolation::AddExisting(id)
            | ProtocolViolation::RemoveMissing(id)
            | ProtocolViolation::ChangeMissing(id) => id,
        }
    }
}

impl std::fmt::Display for ProtocolViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolViolation::AddExisting(id) => {
                write!(f, "expected not to find a document already present for an add: {id}")
            }
            ProtocolViolation::RemoveMissing(id) => {
                write!(f, "expected to find a document to remove: {id}")
            }
            ProtocolViolation::ChangeMissing(id) => {
                write!(f, "expected to find a document to change: {id}")
            }
        }
    }
}

/// Errors that can occur while reconciling a replica.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A change message contradicted the replica.
    #[error("protocol violation in {collection}: {violation}")]
    Violation {
        /// Collection name.
        collection: String,
        /// The contradiction.
        violation: ProtocolViolation,
    },

    /// Frames arrived out of order.
    #[error("framing error in {collection}: {message}")]
    Framing {
        /// Collection name.
        collection: String,
        /// Description of the framing error.
        message: String,
    },

    /// Document table error.
    #[error("table error: {0}")]
    Table(#[from] CoreError),

    /// Frame decoding error.
    #[error("codec error: {0}")]
    Codec(#[from] ProtocolError),

    /// A frame targeted a collection with no registered store.
    #[error("no store registered for collection {collection}")]
    UnknownCollection {
        /// Collection name.
        collection: String,
    },

    /// Too many frames queued for an unregistered collection.
    #[error("too many queued updates for collection {collection} (limit {limit})")]
    QueueOverflow {
        /// Collection name.
        collection: String,
        /// Configured limit.
        limit: usize,
    },

    /// A collection worker stopped before its queue drained.
    #[error("worker for collection {collection} stopped: {message}")]
    WorkerStopped {
        /// Collection name.
        collection: String,
        /// Reason.
        message: String,
    },

    /// Frame source failure.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },
}

impl EngineError {
    /// Creates a framing error.
    pub fn framing(collection: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Framing {
            collection: collection.into(),
            message: message.into(),
        }
    }

    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true for contradictions between the authority and the
    /// replica, including unrecognized message kinds.
    pub fn is_protocol_violation(&self) -> bool {
        match self {
            EngineError::Violation { .. } => true,
            EngineError::Codec(err) => err.is_unknown_message(),
            _ => false,
        }
    }

    /// Returns true if retrying cannot succeed.
    pub fn is_fatal(&self) -> bool {
        match self {
            EngineError::Transport { retryable, .. } => !retryable,
            EngineError::WorkerStopped { .. } => false,
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let violation = EngineError::Violation {
            collection: "c".into(),
            violation: ProtocolViolation::AddExisting(DocumentId::text("1")),
        };
        assert!(violation.is_protocol_violation());
        assert!(violation.is_fatal());

        let unknown = EngineError::from(ProtocolError::UnknownMessage {
            kind: "moved".into(),
        });
        assert!(unknown.is_protocol_violation());

        let framing = EngineError::framing("c", "update outside a batch");
        assert!(!framing.is_protocol_violation());
        assert!(framing.is_fatal());

        assert!(!EngineError::transport_retryable("reset by peer").is_fatal());
        assert!(EngineError::transport_fatal("bad frame").is_fatal());
    }

    #[test]
    fn error_display() {
        let err = EngineError::Violation {
            collection: "tasks".into(),
            violation: ProtocolViolation::RemoveMissing(DocumentId::text("a")),
        };
        let text = err.to_string();
        assert!(text.contains("tasks"));
        assert!(text.contains("remove"));

        let err = EngineError::QueueOverflow {
            collection: "tasks".into(),
            limit: 3,
        };
        assert!(err.to_string().contains("limit 3"));
    }

    #[test]
    fn violation_id() {
        let id = DocumentId::text("x");
        assert_eq!(ProtocolViolation::ChangeMissing(id.clone()).id(), &id);
    }
}
