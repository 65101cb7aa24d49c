//! Error types for publishing.

use docsync_core::CoreError;
use thiserror::Error;

/// Result type for publish operations.
pub type PublishResult<T> = Result<T, PublishError>;

/// Errors that can occur while publishing live queries.
#[derive(Error, Debug)]
pub enum PublishError {
    /// Two cursors of one publication target the same collection.
    #[error("publication returned multiple cursors for collection {collection}")]
    DuplicateCollection {
        /// Collection name.
        collection: String,
    },

    /// The live query could not be started.
    #[error("live query error: {0}")]
    Query(#[from] CoreError),
}

impl PublishError {
    /// Returns true if the publication itself was malformed.
    pub fn is_client_error(&self) -> bool {
        match self {
            PublishError::DuplicateCollection { .. } => true,
            PublishError::Query(err) => err.is_input_error(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_collection_display() {
        let err = PublishError::DuplicateCollection {
            collection: "tasks".into(),
        };
        assert!(err.to_string().contains("tasks"));
        assert!(err.is_client_error());
    }

    #[test]
    fn query_errors_convert() {
        let err = PublishError::from(CoreError::invalid_selector("array"));
        assert!(matches!(err, PublishError::Query(_)));
        assert!(err.is_client_error());
    }
}
