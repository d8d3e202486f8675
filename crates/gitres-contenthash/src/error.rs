use thiserror::Error;

/// Errors from content hashing.
///
/// Every concurrent waiter on a deduplicated checksum receives a copy of
/// the same error, so variants carry rendered messages and are `Clone`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContentHashError {
    /// The build backend could not evaluate or finalize the definition.
    #[error("build failed: {0}")]
    Build(String),

    /// The checksum walk or metadata access failed.
    #[error("failed to compute content digest: {0}")]
    Hash(String),
}

/// Result alias for content hashing.
pub type ContentHashResult<T> = Result<T, ContentHashError>;
