use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use gitres_crypto::StringDigest;
use gitres_types::Digest;

use crate::error::ContentHashResult;
use crate::options::ChecksumOptions;

/// A build-graph description of some file tree, e.g. "commit X of remote
/// Y, without its `.git` directory".
///
/// `source` names the content the backend should produce; `attrs` carry
/// everything else that shaped the build, including how it was fetched.
/// Two definitions that differ only in `attrs` may well produce identical
/// trees.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Definition {
    pub source: String,
    pub attrs: BTreeMap<String, String>,
}

impl Definition {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            attrs: BTreeMap::new(),
        }
    }

    /// Returns a copy with `key` set to `value`.
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    /// Identity of the definition as a whole.
    pub fn digest(&self) -> Digest {
        let mut builder = StringDigest::new();
        builder.push("definition/v1").push(&self.source);
        for (key, value) in &self.attrs {
            builder.push(format!("{key}={value}"));
        }
        builder.finish()
    }
}

/// Immutable handle to an evaluated build result.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentRef {
    id: String,
}

impl ContentRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// Stable identity of the evaluated result.
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for ContentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// The build evaluation backend.
///
/// Implementations must be safe to share across tasks; every method may be
/// called concurrently for the same [`ContentRef`].
#[async_trait]
pub trait BuildBackend: Send + Sync {
    /// Evaluate a definition into an immutable content reference.
    ///
    /// Failures are [`ContentHashError::Build`](crate::ContentHashError::Build).
    async fn evaluate(&self, definition: &Definition) -> ContentHashResult<ContentRef>;

    /// Make sure the content behind `content` is materialized.
    async fn finalize(&self, content: &ContentRef) -> ContentHashResult<()>;

    /// Walk `subdir` of `content` and digest what is found there.
    async fn checksum(
        &self,
        content: &ContentRef,
        subdir: &str,
        options: &ChecksumOptions,
    ) -> ContentHashResult<Digest>;

    /// Read a metadata value stored against `content`.
    async fn metadata(&self, content: &ContentRef, key: &str) -> ContentHashResult<Option<String>>;

    /// Store a metadata value against `content`.
    async fn set_metadata(&self, content: &ContentRef, key: &str, value: &str)
        -> ContentHashResult<()>;
}
