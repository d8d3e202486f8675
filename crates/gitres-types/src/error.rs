use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid digest {0:?}: expected \"blake3:<hex>\"")]
    InvalidDigest(String),

    /// The string carries no recognizable protocol (e.g. `github.com/org/repo`).
    #[error("unknown protocol in git URL {0:?}")]
    UnknownProtocol(String),

    #[error("invalid git URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
}
