//! The [`Ref`] value type.

use serde::{Deserialize, Serialize};

use gitres_crypto::hash_strings;
use gitres_types::Digest;

use crate::names;

/// A named pointer to a commit, as advertised by a remote.
///
/// `name` is a fully-qualified ref path (`refs/heads/main`), a bare commit
/// SHA, or empty when only the SHA is known. Values are immutable; the
/// `with_*` constructors return modified copies.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ref {
    /// Fully resolved ref name, e.g. `refs/heads/main` or `refs/tags/v1.0.0`.
    pub name: String,
    /// The commit SHA the ref points to.
    pub sha: String,
}

impl Ref {
    pub fn new(name: impl Into<String>, sha: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sha: sha.into(),
        }
    }

    /// A ref that is known only by its commit SHA.
    pub fn commit(sha: impl Into<String>) -> Self {
        Self {
            name: String::new(),
            sha: sha.into(),
        }
    }

    pub fn with_name(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sha: self.sha.clone(),
        }
    }

    pub fn with_sha(&self, sha: impl Into<String>) -> Self {
        Self {
            name: self.name.clone(),
            sha: sha.into(),
        }
    }

    /// The name without its `refs/...` prefix.
    pub fn short_name(&self) -> &str {
        names::short_name(&self.name)
    }

    pub fn is_branch(&self) -> bool {
        self.name.starts_with("refs/heads/")
    }

    pub fn is_tag(&self) -> bool {
        self.name.starts_with("refs/tags/")
    }

    /// Returns `true` for the `^{}` entry giving an annotated tag's commit.
    pub fn is_peeled(&self) -> bool {
        self.name.ends_with(PEELED_SUFFIX)
    }

    /// Returns `true` once `sha` is a well-formed commit id.
    pub fn has_commit(&self) -> bool {
        names::is_commit_sha(&self.sha)
    }

    /// Digest over name and SHA.
    pub fn digest(&self) -> Digest {
        hash_strings([self.name.as_str(), self.sha.as_str()])
    }
}

/// Suffix marking a peeled (dereferenced) annotated tag entry.
pub const PEELED_SUFFIX: &str = "^{}";
