//! Refs within repositories.

use std::sync::Arc;

use gitres_contenthash::Definition;
use gitres_crypto::StringDigest;
use gitres_refs::{is_commit_sha, validate_ref_name, Ref};
use gitres_types::Digest;

use crate::error::{ResolveError, ResolveResult};
use crate::repository::{GitRepository, RepoRequest};

/// A request for a ref of some repository.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefRequest {
    pub repo: RepoRequest,
    /// What to look up: a name, a commit, or a name pinned to a commit.
    pub target: Ref,
}

impl RefRequest {
    /// Any name `git checkout` would accept: branch, tag, full ref or SHA.
    pub fn named(repo: RepoRequest, name: impl Into<String>) -> Self {
        Self {
            repo,
            target: Ref::new(name, ""),
        }
    }

    /// The repository's HEAD, honouring a pinned head.
    pub fn head(repo: RepoRequest) -> Self {
        let target = match repo.pinned_head() {
            Some(pinned) if pinned.name.is_empty() => pinned.with_name("HEAD"),
            Some(pinned) => pinned,
            None => Ref::new("HEAD", ""),
        };
        Self { repo, target }
    }

    /// A branch. `main` and `refs/heads/main` are equivalent.
    pub fn branch(repo: RepoRequest, name: &str) -> ResolveResult<Self> {
        Self::qualified(repo, "refs/heads/", name)
    }

    /// A tag. `v1.0.0` and `refs/tags/v1.0.0` are equivalent.
    pub fn tag(repo: RepoRequest, name: &str) -> ResolveResult<Self> {
        Self::qualified(repo, "refs/tags/", name)
    }

    fn qualified(repo: RepoRequest, prefix: &str, name: &str) -> ResolveResult<Self> {
        let full = format!("{prefix}{}", name.strip_prefix(prefix).unwrap_or(name));
        validate_ref_name(&full)?;
        Ok(Self::named(repo, full))
    }

    /// A commit by full SHA.
    pub fn commit(repo: RepoRequest, sha: &str) -> ResolveResult<Self> {
        if !is_commit_sha(sha) {
            return Err(ResolveError::InvalidInput(format!("invalid commit SHA: {sha:?}")));
        }
        Ok(Self {
            repo,
            target: Ref::commit(sha),
        })
    }

    /// Pin the looked-up ref to `sha`.
    pub fn with_commit(mut self, sha: impl Into<String>) -> Self {
        self.target = self.target.with_sha(sha);
        self
    }

    /// The string handed to [`Remote::lookup`](gitres_refs::Remote::lookup).
    pub fn lookup_target(&self) -> &str {
        if self.target.name.is_empty() {
            &self.target.sha
        } else {
            &self.target.name
        }
    }

    pub fn identity(&self) -> Digest {
        let mut builder = StringDigest::new();
        builder
            .push("gitref-request/v1")
            .push(self.repo.identity().to_string())
            .push(format!("name:{}", self.target.name))
            .push(format!("sha:{}", self.target.sha));
        builder.finish()
    }
}

/// A ref bound to a repository.
///
/// The repository is shared, not copied. Rebinding produces a new `GitRef`
/// pointing at another repository and leaves this one untouched.
#[derive(Clone, Debug)]
pub struct GitRef {
    repo: Arc<GitRepository>,
    request: RefRequest,
    reference: Ref,
    resolved: bool,
}

impl GitRef {
    /// The unresolved placeholder for `request`.
    pub fn from_request(request: RefRequest) -> ResolveResult<Self> {
        let repo = Arc::new(GitRepository::from_request(request.repo.clone())?);
        Ok(Self {
            reference: request.target.clone(),
            repo,
            request,
            resolved: false,
        })
    }

    /// A resolved, unnamed ref to `sha` in `repo`.
    pub(crate) fn unnamed(repo: Arc<GitRepository>, sha: impl Into<String>) -> Self {
        let reference = Ref::commit(sha);
        Self {
            request: RefRequest {
                repo: repo.request().clone(),
                target: reference.clone(),
            },
            repo,
            reference,
            resolved: true,
        }
    }

    /// A copy bound to `repo`.
    pub(crate) fn rebind(&self, repo: Arc<GitRepository>) -> Self {
        Self {
            repo,
            ..self.clone()
        }
    }

    /// A resolved copy pointing at `reference`.
    pub(crate) fn resolved_as(&self, reference: Ref) -> Self {
        Self {
            reference,
            resolved: true,
            ..self.clone()
        }
    }

    pub fn request(&self) -> &RefRequest {
        &self.request
    }

    pub fn repository(&self) -> &Arc<GitRepository> {
        &self.repo
    }

    pub fn reference(&self) -> &Ref {
        &self.reference
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// The commit SHA, once known.
    pub fn commit(&self) -> Option<&str> {
        Some(self.reference.sha.as_str()).filter(|sha| !sha.is_empty())
    }

    /// The full ref name, or the commit SHA for unnamed refs.
    pub fn ref_name(&self) -> &str {
        if self.reference.name.is_empty() {
            &self.reference.sha
        } else {
            &self.reference.name
        }
    }
}

/// Options for checking out a tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TreeOptions {
    pub discard_git_dir: bool,
    pub depth: u32,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            discard_git_dir: false,
            depth: 1,
        }
    }
}

/// A checked-out tree.
#[derive(Clone, Debug)]
pub struct GitTree {
    /// How the backend builds the tree.
    pub definition: Definition,
    /// Digest of the files, excluding `.git`.
    pub content: Digest,
    pub options: TreeOptions,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHA: &str = "b6315d8f2810962c601af73f86831f6866ea798b";

    fn repo() -> RepoRequest {
        RepoRequest::remote("https://h/r")
    }

    #[test]
    fn branch_and_tag_normalize() {
        assert_eq!(
            RefRequest::branch(repo(), "main").unwrap().target.name,
            "refs/heads/main"
        );
        assert_eq!(
            RefRequest::branch(repo(), "refs/heads/main").unwrap(),
            RefRequest::branch(repo(), "main").unwrap()
        );
        assert_eq!(
            RefRequest::tag(repo(), "v1.0.0").unwrap().target.name,
            "refs/tags/v1.0.0"
        );
    }

    #[test]
    fn branch_rejects_bad_names() {
        assert!(matches!(
            RefRequest::branch(repo(), "bad..name"),
            Err(ResolveError::InvalidInput(_))
        ));
    }

    #[test]
    fn commit_requires_full_sha() {
        assert!(RefRequest::commit(repo(), SHA).is_ok());
        assert!(matches!(
            RefRequest::commit(repo(), "b6315d8"),
            Err(ResolveError::InvalidInput(_))
        ));
        assert_eq!(RefRequest::commit(repo(), SHA).unwrap().lookup_target(), SHA);
    }

    #[test]
    fn head_honours_pins() {
        assert_eq!(RefRequest::head(repo()).target, Ref::new("HEAD", ""));
        assert_eq!(
            RefRequest::head(repo().with_commit(SHA)).target,
            Ref::new("HEAD", SHA)
        );
        assert_eq!(
            RefRequest::head(repo().with_ref("refs/heads/dev")).target,
            Ref::new("refs/heads/dev", "")
        );
    }

    #[test]
    fn rebinding_leaves_original() {
        let original = GitRef::from_request(RefRequest::named(repo(), "main")).unwrap();
        let other = Arc::new(GitRepository::from_request(RepoRequest::remote("https://x/y")).unwrap());
        let rebound = original.rebind(other.clone());
        assert!(Arc::ptr_eq(rebound.repository(), &other));
        assert!(!Arc::ptr_eq(original.repository(), &other));
    }

    #[test]
    fn unnamed_ref_reports_sha() {
        let repo = Arc::new(GitRepository::from_request(repo()).unwrap());
        let r = GitRef::unnamed(repo, SHA);
        assert!(r.is_resolved());
        assert_eq!(r.ref_name(), SHA);
        assert_eq!(r.commit(), Some(SHA));
    }
}
