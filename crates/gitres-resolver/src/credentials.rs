//! Credentials and the stores they come from.
//!
//! Secrets and sockets travel as handles: the handle id is what enters
//! request identities, the plaintext or socket path is only handed to the
//! transport.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use gitres_types::Digest;

use crate::error::ResolveResult;

/// A secret value with a stable, non-secret id.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretHandle {
    id: String,
    plaintext: String,
}

impl SecretHandle {
    pub fn new(id: impl Into<String>, plaintext: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            plaintext: plaintext.into(),
        }
    }

    /// A handle whose id is derived from the secret itself, so the same
    /// secret always gets the same handle.
    pub fn from_plaintext(plaintext: impl Into<String>) -> Self {
        let plaintext = plaintext.into();
        Self {
            id: Digest::from_bytes(plaintext.as_bytes()).to_hex(),
            plaintext,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn expose(&self) -> &str {
        &self.plaintext
    }
}

impl fmt::Debug for SecretHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretHandle")
            .field("id", &self.id)
            .field("plaintext", &"***")
            .finish()
    }
}

/// A unix socket (usually an ssh agent) owned by some client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SocketHandle {
    id: String,
    path: PathBuf,
}

impl SocketHandle {
    pub fn new(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
        }
    }

    /// The agent socket of `client_id` at `path`.
    pub fn for_client(client_id: &str, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            id: format!("{client_id}:{}", path.display()),
            path,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// A username and secret from a credential store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub secret: SecretHandle,
}

/// Credential store lookups, keyed like git credential helpers.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn lookup(&self, scheme: &str, host: &str, path: &str)
        -> ResolveResult<Option<Credential>>;
}

/// Finds the ssh agent socket a client exposes.
#[async_trait]
pub trait SocketProvider: Send + Sync {
    async fn ssh_auth_socket(&self, client_id: &str) -> ResolveResult<Option<SocketHandle>>;
}

/// A fixed in-memory credential store.
#[derive(Default)]
pub struct StaticCredentials {
    entries: RwLock<HashMap<(String, String), Credential>>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `password` for `scheme://host`. Any path on the host matches.
    pub fn insert(&self, scheme: &str, host: &str, username: &str, password: &str) {
        let credential = Credential {
            username: username.to_string(),
            secret: SecretHandle::from_plaintext(password),
        };
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((scheme.to_string(), host.to_string()), credential);
    }
}

#[async_trait]
impl CredentialStore for StaticCredentials {
    async fn lookup(
        &self,
        scheme: &str,
        host: &str,
        _path: &str,
    ) -> ResolveResult<Option<Credential>> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(scheme.to_string(), host.to_string()))
            .cloned())
    }
}

/// Per-client agent sockets registered up front.
#[derive(Default)]
pub struct StaticSockets {
    sockets: RwLock<HashMap<String, PathBuf>>,
}

impl StaticSockets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, client_id: &str, path: impl Into<PathBuf>) {
        self.sockets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(client_id.to_string(), path.into());
    }
}

#[async_trait]
impl SocketProvider for StaticSockets {
    async fn ssh_auth_socket(&self, client_id: &str) -> ResolveResult<Option<SocketHandle>> {
        Ok(self
            .sockets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(client_id)
            .map(|path| SocketHandle::for_client(client_id, path.clone())))
    }
}

/// Hands every client the `SSH_AUTH_SOCK` of the current process.
#[derive(Clone, Copy, Debug, Default)]
pub struct EnvSockets;

#[async_trait]
impl SocketProvider for EnvSockets {
    async fn ssh_auth_socket(&self, client_id: &str) -> ResolveResult<Option<SocketHandle>> {
        Ok(std::env::var_os("SSH_AUTH_SOCK")
            .filter(|path| !path.is_empty())
            .map(|path| SocketHandle::for_client(client_id, path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_debug_hides_plaintext() {
        let secret = SecretHandle::from_plaintext("hunter2");
        let shown = format!("{secret:?}");
        assert!(!shown.contains("hunter2"));
        assert!(shown.contains(secret.id()));
    }

    #[test]
    fn same_secret_same_handle() {
        assert_eq!(
            SecretHandle::from_plaintext("a").id(),
            SecretHandle::from_plaintext("a").id()
        );
        assert_ne!(
            SecretHandle::from_plaintext("a").id(),
            SecretHandle::from_plaintext("b").id()
        );
    }

    #[tokio::test]
    async fn static_credentials_match_scheme_and_host() {
        let store = StaticCredentials::new();
        store.insert("https", "example.com", "alice", "s3cret");

        let found = store.lookup("https", "example.com", "/org/repo").await.unwrap();
        let found = found.unwrap();
        assert_eq!(found.username, "alice");
        assert_eq!(found.secret.expose(), "s3cret");

        assert!(store.lookup("http", "example.com", "/").await.unwrap().is_none());
        assert!(store.lookup("https", "other.com", "/").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sockets_are_per_client() {
        let sockets = StaticSockets::new();
        sockets.insert("a", "/tmp/agent-a.sock");
        let handle = sockets.ssh_auth_socket("a").await.unwrap().unwrap();
        assert_eq!(handle.path(), Path::new("/tmp/agent-a.sock"));
        assert!(sockets.ssh_auth_socket("b").await.unwrap().is_none());
    }
}
