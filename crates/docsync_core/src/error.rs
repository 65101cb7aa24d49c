//! Error types for docsync core.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised by the document table and the document model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// A document with this identifier is already stored.
    #[error("duplicate document {id} in collection {collection}")]
    DuplicateId {
        /// Collection name.
        collection: String,
        /// Stringified document identifier.
        id: String,
    },

    /// No document with this identifier is stored.
    #[error("document {id} not found in collection {collection}")]
    DocumentNotFound {
        /// Collection name.
        collection: String,
        /// Stringified document identifier.
        id: String,
    },

    /// The selector shape is rejected before it reaches the table.
    #[error("invalid selector: {message}")]
    InvalidSelector {
        /// Why the selector was rejected.
        message: String,
    },

    /// An encoded identifier could not be parsed.
    #[error("invalid document id: {message}")]
    InvalidId {
        /// Description of the problem.
        message: String,
    },

    /// An update tried to set or unset the identifier field.
    #[error("the _id field of document {id} in collection {collection} is immutable")]
    ImmutableId {
        /// Collection name.
        collection: String,
        /// Stringified document identifier.
        id: String,
    },
}

impl CoreError {
    /// Creates an invalid selector error.
    pub fn invalid_selector(message: impl Into<String>) -> Self {
        Self::InvalidSelector {
            message: message.into(),
        }
    }

    /// Creates an invalid id error.
    pub fn invalid_id(message: impl Into<String>) -> Self {
        Self::InvalidId {
            message: message.into(),
        }
    }

    /// Returns true if the error was caused by caller input rather than
    /// by the current table contents.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            CoreError::InvalidSelector { .. } | CoreError::InvalidId { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = CoreError::DuplicateId {
            collection: "tasks".into(),
            id: "abc".into(),
        };
        assert_eq!(err.to_string(), "duplicate document abc in collection tasks");

        let err = CoreError::invalid_selector("array selectors are not allowed");
        assert!(err.to_string().contains("array"));
    }

    #[test]
    fn input_errors() {
        assert!(CoreError::invalid_selector("x").is_input_error());
        assert!(CoreError::invalid_id("x").is_input_error());
        assert!(!CoreError::DocumentNotFound {
            collection: "c".into(),
            id: "1".into()
        }
        .is_input_error());
    }
}
