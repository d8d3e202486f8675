//! Canonical cache identities.
//!
//! These digests let every spelling of the same repository, and every
//! credential of the same kind, converge on one cache entry. Only the
//! *kind* of auth in use is recorded. Secrets, their handles and socket
//! paths never are, so callers must re-validate access on every request
//! before a cached result is served.

use gitres_crypto::hash_strings;
use gitres_refs::Ref;
use gitres_types::Digest;

use crate::repository::RemoteRepository;

/// Identity of a resolved remote repository.
pub fn repository_digest(remote: &RemoteRepository, discard_git_dir: bool) -> Digest {
    let mut parts = vec!["gitrepo/v1".to_string()];
    if let Some(url) = remote.url() {
        parts.push(url.remote());
    }
    if remote.ssh_auth_socket().is_some() {
        parts.push("sshAuthSock:true".into());
    }
    if remote.has_auth_token() {
        parts.push("authToken:true".into());
    }
    if remote.has_auth_header() {
        parts.push("authHeader:true".into());
    }
    if let Some(username) = remote.auth_username().filter(|u| !u.is_empty()) {
        parts.push(format!("authUsername:{username}"));
    }
    if discard_git_dir {
        parts.push("discardGitDir".into());
    }
    hash_strings(parts)
}

/// Identity of a resolved ref: its name and commit, nothing else.
pub fn ref_digest(r: &Ref) -> Digest {
    let mut parts = vec!["gitref/v1".to_string()];
    if !r.name.is_empty() {
        parts.push(format!("name:{}", r.name));
    }
    if !r.sha.is_empty() {
        parts.push(format!("sha:{}", r.sha));
    }
    hash_strings(parts)
}

/// Identity of a checked-out tree.
pub fn tree_digest(content: &Digest, discard_git_dir: bool, depth: u32) -> Digest {
    let mut parts = vec![content.to_string()];
    if discard_git_dir {
        parts.push("discardGitDir:true".into());
    }
    if depth != 1 {
        parts.push(format!("depth:{depth}"));
    }
    hash_strings(parts)
}
