//! Error types for argus-core
//!
//! One taxonomy shared by the run controller, conversation store, and the
//! HTTP layer, which maps variants onto response status codes.

use thiserror::Error;
use uuid::Uuid;

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// Unknown conversation id
    #[error("conversation {0} not found")]
    NotFound(Uuid),

    /// A run is already active for this conversation
    #[error("a run is already active for conversation {conversation_id}")]
    AlreadyRunning {
        /// The conversation holding the active run
        conversation_id: Uuid,
    },

    /// Malformed or missing request data
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Engine reported a failure during a run
    #[error("engine error: {0}")]
    Engine(String),

    /// Unexpected internal failure
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether the error is a client-side conflict (start/delete rejected,
    /// no state change).
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::AlreadyRunning { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_contains_ids() {
        let id = Uuid::nil();
        let err = Error::AlreadyRunning {
            conversation_id: id,
        };
        assert!(err.to_string().contains(&id.to_string()));
        assert!(err.is_conflict());

        let err = Error::NotFound(id);
        assert!(err.to_string().contains("not found"));
        assert!(!err.is_conflict());
    }
}
