use std::fmt;
use std::time::Duration;

use thiserror::Error;

use gitres_contenthash::ContentHashError;
use gitres_refs::RefError;
use gitres_types::TypeError;

/// Resolution step an error surfaced from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    ProtocolInference,
    CredentialLookup,
    LeafFetch,
    RefLookup,
    RepositoryResolution,
    MergeBase,
    TreeFetch,
    ContentHash,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ProtocolInference => "protocol inference",
            Self::CredentialLookup => "credential lookup",
            Self::LeafFetch => "leaf fetch",
            Self::RefLookup => "ref lookup",
            Self::RepositoryResolution => "repository resolution",
            Self::MergeBase => "merge base",
            Self::TreeFetch => "tree fetch",
            Self::ContentHash => "content hash",
        })
    }
}

/// Failures reported by a [`GitTransport`](crate::transport::GitTransport).
#[derive(Debug, Error)]
pub enum TransportError {
    /// The remote rejected our credentials or demanded some.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The remote or object does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("git failed: {0}")]
    Failed(String),

    #[error("operation not supported by this transport: {0}")]
    Unsupported(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from repository and ref resolution.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// No usable credential for a protocol that requires one.
    #[error("authentication required: {0}")]
    Auth(String),

    /// Malformed URL, SHA or option.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The remote does not advertise the requested ref.
    #[error("{0}")]
    NotFound(String),

    /// The remote advertised a malformed commit id.
    #[error("{0}")]
    InvalidRef(String),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("{0}")]
    Build(String),

    #[error("{0}")]
    ContentHash(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("gave up after {limit} redirects")]
    RedirectLimit { limit: usize },

    #[error("{step}: {source}")]
    Step {
        step: Step,
        #[source]
        source: Box<ResolveError>,
    },
}

impl ResolveError {
    /// Returns `true` for authentication failures, including ones wrapped
    /// in [`ResolveError::Step`] or reported by the transport.
    pub fn is_auth(&self) -> bool {
        match self {
            Self::Auth(_) | Self::Transport(TransportError::Auth(_)) => true,
            Self::Step { source, .. } => source.is_auth(),
            _ => false,
        }
    }

    /// The innermost error, skipping [`ResolveError::Step`] wrappers.
    pub fn root(&self) -> &ResolveError {
        match self {
            Self::Step { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<RefError> for ResolveError {
    fn from(err: RefError) -> Self {
        match err {
            RefError::NotFound { .. } => Self::NotFound(err.to_string()),
            RefError::InvalidRef { .. } => Self::InvalidRef(err.to_string()),
            RefError::AlreadyExists { .. } | RefError::InvalidRefName { .. } => {
                Self::InvalidInput(err.to_string())
            }
        }
    }
}

impl From<ContentHashError> for ResolveError {
    fn from(err: ContentHashError) -> Self {
        match err {
            ContentHashError::Build(_) => Self::Build(err.to_string()),
            ContentHashError::Hash(_) => Self::ContentHash(err.to_string()),
        }
    }
}

impl From<TypeError> for ResolveError {
    fn from(err: TypeError) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

/// Attach the failing [`Step`] to an error.
pub trait StepExt<T> {
    fn step(self, step: Step) -> ResolveResult<T>;
}

impl<T, E: Into<ResolveError>> StepExt<T> for Result<T, E> {
    fn step(self, step: Step) -> ResolveResult<T> {
        self.map_err(|e| {
            let source = e.into();
            match source {
                // the step is already named
                ResolveError::Step { .. } => source,
                source => ResolveError::Step {
                    step,
                    source: Box::new(source),
                },
            }
        })
    }
}

/// Result alias for resolution.
pub type ResolveResult<T> = Result<T, ResolveError>;
