//! Error types for ref operations.

use thiserror::Error;

/// Errors that can occur while indexing or looking up refs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RefError {
    /// No advertised ref matches the requested name.
    #[error("repository does not contain ref {name:?}")]
    NotFound { name: String },

    /// A ref with this name is already indexed.
    #[error("ref already exists: {name}")]
    AlreadyExists { name: String },

    /// The ref name is not a valid git ref name.
    #[error("invalid ref name {name:?}: {reason}")]
    InvalidRefName { name: String, reason: String },

    /// The matched entry does not point at a well-formed commit.
    #[error("invalid commit sha {sha:?} for {name:?}")]
    InvalidRef { name: String, sha: String },
}

/// Convenience type alias for ref operations.
pub type RefResult<T> = std::result::Result<T, RefError>;
