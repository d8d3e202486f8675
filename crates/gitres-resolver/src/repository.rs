//! Repository requests and descriptors.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use gitres_crypto::StringDigest;
use gitres_refs::{Ref, Remote};
use gitres_types::{Digest, GitUrl, TypeError};

use crate::credentials::{SecretHandle, SocketHandle};
use crate::error::{ResolveError, ResolveResult};
use crate::transport::AuthConfig;

/// Where a repository comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RepoSource {
    /// A remote URL as the caller spelled it, possibly without a scheme.
    Remote(String),
    /// A working copy on the local filesystem.
    Local(PathBuf),
}

/// Credential attached by a redirect.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum RedirectAuth {
    Socket(SocketHandle),
    Token {
        username: Option<String>,
        token: SecretHandle,
    },
}

/// A request for a repository, holding only caller-supplied fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RepoRequest {
    pub source: RepoSource,
    pub keep_git_dir: bool,
    pub ssh_known_hosts: Option<String>,
    pub ssh_auth_socket: Option<SocketHandle>,
    pub http_auth_username: Option<String>,
    pub http_auth_token: Option<SecretHandle>,
    pub http_auth_header: Option<SecretHandle>,
    /// Hostnames of services the remote is reachable through.
    pub services: Vec<String>,
    /// Pinned HEAD commit.
    pub commit: Option<String>,
    /// Pinned HEAD ref name.
    pub ref_name: Option<String>,
}

impl RepoRequest {
    pub fn remote(url: impl Into<String>) -> Self {
        Self::with_source(RepoSource::Remote(url.into()))
    }

    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self::with_source(RepoSource::Local(path.into()))
    }

    fn with_source(source: RepoSource) -> Self {
        Self {
            source,
            keep_git_dir: false,
            ssh_known_hosts: None,
            ssh_auth_socket: None,
            http_auth_username: None,
            http_auth_token: None,
            http_auth_header: None,
            services: Vec::new(),
            commit: None,
            ref_name: None,
        }
    }

    pub fn with_keep_git_dir(mut self, keep: bool) -> Self {
        self.keep_git_dir = keep;
        self
    }

    pub fn with_known_hosts(mut self, known_hosts: impl Into<String>) -> Self {
        self.ssh_known_hosts = Some(known_hosts.into());
        self
    }

    pub fn with_ssh_auth_socket(mut self, socket: SocketHandle) -> Self {
        self.ssh_auth_socket = Some(socket);
        self
    }

    pub fn with_auth_username(mut self, username: impl Into<String>) -> Self {
        self.http_auth_username = Some(username.into());
        self
    }

    /// Returns a copy authenticating over HTTP with `token`.
    pub fn with_auth_token(mut self, token: SecretHandle) -> Self {
        self.http_auth_token = Some(token);
        self
    }

    /// Returns a copy sending `header` as the HTTP `Authorization` header.
    pub fn with_auth_header(mut self, header: SecretHandle) -> Self {
        self.http_auth_header = Some(header);
        self
    }

    pub fn with_service(mut self, host: impl Into<String>) -> Self {
        self.services.push(host.into());
        self
    }

    /// Pin HEAD to `commit`.
    pub fn with_commit(mut self, commit: impl Into<String>) -> Self {
        self.commit = Some(commit.into());
        self
    }

    /// Pin HEAD to the ref `name`.
    pub fn with_ref(mut self, name: impl Into<String>) -> Self {
        self.ref_name = Some(name.into());
        self
    }

    /// An ssh socket, token or header is attached.
    pub fn has_explicit_auth(&self) -> bool {
        self.ssh_auth_socket.is_some()
            || self.http_auth_token.is_some()
            || self.http_auth_header.is_some()
    }

    /// The HEAD override implied by the pinned commit and ref.
    pub fn pinned_head(&self) -> Option<Ref> {
        if self.commit.is_none() && self.ref_name.is_none() {
            return None;
        }
        Some(Ref::new(
            self.ref_name.clone().unwrap_or_default(),
            self.commit.clone().unwrap_or_default(),
        ))
    }

    /// Cache identity of the request.
    ///
    /// Secrets and sockets contribute their handle ids, never their
    /// contents. Two requests with different credentials have different
    /// identities; convergence happens later through canonical digests.
    pub fn identity(&self) -> Digest {
        let mut builder = StringDigest::new();
        builder.push("gitrepo-request/v1");
        match &self.source {
            RepoSource::Remote(url) => builder.push(format!("remote:{url}")),
            RepoSource::Local(path) => builder.push(format!("local:{}", path.display())),
        };
        builder.push(format!("keepGitDir:{}", self.keep_git_dir));
        if let Some(known_hosts) = &self.ssh_known_hosts {
            builder.push("sshKnownHosts").push(known_hosts);
        }
        if let Some(socket) = &self.ssh_auth_socket {
            builder.push("sshAuthSock").push(socket.id());
        }
        if let Some(username) = &self.http_auth_username {
            builder.push("authUsername").push(username);
        }
        if let Some(token) = &self.http_auth_token {
            builder.push("authToken").push(token.id());
        }
        if let Some(header) = &self.http_auth_header {
            builder.push("authHeader").push(header.id());
        }
        for service in &self.services {
            builder.push("service").push(service);
        }
        if let Some(head) = self.pinned_head() {
            builder
                .push(format!("head-name:{}", head.name))
                .push(format!("head-sha:{}", head.sha));
        }
        builder.finish()
    }

    /// The request to issue when redirecting to `url`.
    ///
    /// Peripheral options always carry over. Existing auth carries over
    /// unless `auth` replaces it.
    pub(crate) fn redirect(&self, url: impl Into<String>, auth: Option<RedirectAuth>) -> Self {
        let mut next = Self {
            source: RepoSource::Remote(url.into()),
            ..self.clone()
        };
        match auth {
            None => {}
            Some(RedirectAuth::Socket(socket)) => {
                next.ssh_auth_socket = Some(socket);
                next.http_auth_token = None;
                next.http_auth_header = None;
                next.http_auth_username = None;
            }
            Some(RedirectAuth::Token { username, token }) => {
                next.ssh_auth_socket = None;
                next.http_auth_header = None;
                next.http_auth_token = Some(token);
                next.http_auth_username = username;
            }
        }
        next
    }
}

/// A repository backed by a remote URL.
#[derive(Clone, Debug)]
pub struct RemoteRepository {
    url: Option<GitUrl>,
    ssh_known_hosts: Option<String>,
    ssh_auth_socket: Option<SocketHandle>,
    auth_username: Option<String>,
    auth_token: Option<SecretHandle>,
    auth_header: Option<SecretHandle>,
    services: Vec<String>,
    refs: Option<Arc<Remote>>,
}

impl RemoteRepository {
    /// The parsed URL; `None` while the caller's spelling is ambiguous.
    pub fn url(&self) -> Option<&GitUrl> {
        self.url.as_ref()
    }

    pub fn ssh_auth_socket(&self) -> Option<&SocketHandle> {
        self.ssh_auth_socket.as_ref()
    }

    pub fn ssh_known_hosts(&self) -> Option<&str> {
        self.ssh_known_hosts.as_deref()
    }

    pub fn auth_username(&self) -> Option<&str> {
        self.auth_username.as_deref()
    }

    pub fn has_auth_token(&self) -> bool {
        self.auth_token.is_some()
    }

    pub fn has_auth_header(&self) -> bool {
        self.auth_header.is_some()
    }

    pub fn has_explicit_auth(&self) -> bool {
        self.ssh_auth_socket.is_some() || self.auth_token.is_some() || self.auth_header.is_some()
    }

    pub fn services(&self) -> &[String] {
        &self.services
    }

    /// Material handed to the transport.
    pub fn auth_config(&self) -> AuthConfig {
        AuthConfig {
            ssh_auth_socket: self.ssh_auth_socket.as_ref().map(|s| s.path().to_path_buf()),
            ssh_known_hosts: self.ssh_known_hosts.clone(),
            username: self.auth_username.clone(),
            token: self.auth_token.as_ref().map(|t| t.expose().to_string()),
            header: self.auth_header.as_ref().map(|h| h.expose().to_string()),
        }
    }
}

/// A repository backed by a local working copy.
#[derive(Clone, Debug)]
pub struct LocalRepository {
    path: PathBuf,
}

impl LocalRepository {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `file://` URL of the working copy.
    pub fn url(&self) -> ResolveResult<GitUrl> {
        let absolute = std::path::absolute(&self.path).map_err(|e| {
            ResolveError::InvalidInput(format!("bad path {}: {e}", self.path.display()))
        })?;
        let url = url::Url::from_file_path(&absolute).map_err(|()| {
            ResolveError::InvalidInput(format!("bad path {}", absolute.display()))
        })?;
        Ok(GitUrl::parse(url.as_str())?)
    }
}

/// The closed set of repository backends.
#[derive(Clone, Debug)]
pub enum RepositoryBackend {
    Local(LocalRepository),
    Remote(RemoteRepository),
}

/// A repository descriptor.
///
/// Unresolved descriptors are placeholders built from a [`RepoRequest`].
/// Resolved ones are only produced by the resolver and never change.
#[derive(Clone, Debug)]
pub struct GitRepository {
    request: RepoRequest,
    backend: RepositoryBackend,
    resolved: bool,
}

impl GitRepository {
    /// The unresolved placeholder for `request`.
    ///
    /// A remote URL without a scheme is accepted and left ambiguous; any
    /// other malformed URL is [`ResolveError::InvalidInput`].
    pub fn from_request(request: RepoRequest) -> ResolveResult<Self> {
        let backend = match &request.source {
            RepoSource::Local(path) => RepositoryBackend::Local(LocalRepository { path: path.clone() }),
            RepoSource::Remote(raw) => {
                let url = match GitUrl::parse(raw) {
                    Ok(url) => Some(url),
                    Err(TypeError::UnknownProtocol(_)) => None,
                    Err(e) => return Err(e.into()),
                };
                RepositoryBackend::Remote(RemoteRepository {
                    url,
                    ssh_known_hosts: request.ssh_known_hosts.clone(),
                    ssh_auth_socket: request.ssh_auth_socket.clone(),
                    auth_username: request.http_auth_username.clone(),
                    auth_token: request.http_auth_token.clone(),
                    auth_header: request.http_auth_header.clone(),
                    services: request.services.clone(),
                    refs: None,
                })
            }
        };
        Ok(Self {
            request,
            backend,
            resolved: false,
        })
    }

    /// A resolved copy. Remote backends take `refs` as their ref index,
    /// with the pinned HEAD applied.
    pub(crate) fn resolve_with(&self, refs: Option<Remote>) -> Self {
        let mut resolved = self.clone();
        if let RepositoryBackend::Remote(remote) = &mut resolved.backend {
            remote.refs = refs.map(|refs| {
                Arc::new(match self.request.pinned_head() {
                    Some(head) => refs.with_head(head),
                    None => refs,
                })
            });
        }
        resolved.resolved = true;
        resolved
    }

    pub fn request(&self) -> &RepoRequest {
        &self.request
    }

    pub fn backend(&self) -> &RepositoryBackend {
        &self.backend
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    pub fn keep_git_dir(&self) -> bool {
        self.request.keep_git_dir
    }

    pub fn discard_git_dir(&self) -> bool {
        !self.request.keep_git_dir
    }

    /// The remote backend, if this is one.
    pub fn as_remote(&self) -> Option<&RemoteRepository> {
        match &self.backend {
            RepositoryBackend::Remote(remote) => Some(remote),
            RepositoryBackend::Local(_) => None,
        }
    }

    /// The canonical URL once known: the remote string for remotes, the
    /// `file://` URL for local working copies.
    pub fn url(&self) -> Option<String> {
        match &self.backend {
            RepositoryBackend::Remote(remote) => remote.url().map(GitUrl::remote),
            RepositoryBackend::Local(local) => local.url().ok().map(|url| url.to_string()),
        }
    }

    /// The ref index fetched during resolution.
    pub fn refs(&self) -> Option<&Arc<Remote>> {
        self.as_remote().and_then(|remote| remote.refs.as_ref())
    }

    /// What HEAD resolves to, once the ref index is known.
    pub fn head(&self) -> Option<Ref> {
        self.refs().and_then(|refs| refs.lookup("HEAD").ok())
    }
}

/// Serializable summary of a resolved repository.
#[derive(Clone, Debug, Serialize)]
pub struct RepositorySummary {
    pub url: Option<String>,
    pub head: Option<Ref>,
    pub resolved: bool,
}

impl From<&GitRepository> for RepositorySummary {
    fn from(repo: &GitRepository) -> Self {
        Self {
            url: repo.url(),
            head: repo.head(),
            resolved: repo.is_resolved(),
        }
    }
}
