//! Git repository, ref and tree resolution.
//!
//! A caller describes a repository loosely (a bare `host/org/repo`, an
//! explicit URL, a local path) with or without credentials. The
//! [`Resolver`] turns that description into a resolved [`GitRepository`]
//! by issuing redirects through a [`GraphEngine`] until every decision is
//! fixed, then lists the remote once. Refs and trees resolve on top of the
//! repository.
//!
//! # Design Rules
//!
//! 1. Every redirect is a new engine request with its own cache identity.
//!    Hops are bounded by [`ResolverConfig::max_redirects`].
//! 2. Canonical digests ([`canonical`]) record the kind of auth, never the
//!    secret. Repository and ref results are cached per client so access
//!    is re-proved by every client.
//! 3. A credential store is only consulted on behalf of the client that
//!    authored the request.
//! 4. Descriptors are immutable; state changes return new values.
//!
//! # Modules
//!
//! - [`error`]: [`ResolveError`], [`TransportError`], [`Step`]
//! - [`config`]: [`ResolverConfig`]
//! - [`context`]: [`RequestContext`]
//! - [`credentials`]: secret and socket handles, credential sources
//! - [`repository`]: [`RepoRequest`], [`GitRepository`]
//! - [`gitref`]: [`RefRequest`], [`GitRef`], [`GitTree`]
//! - [`transport`]: [`GitTransport`] and the [`GitCli`] implementation
//! - [`canonical`]: cache identity digests
//! - [`engine`]: [`GraphEngine`] and the caching [`LocalEngine`]
//! - [`resolver`]: the redirect state machine
//! - `testing`: an in-memory transport for tests, behind the `testing` feature

pub mod canonical;
pub mod config;
pub mod context;
pub mod credentials;
pub mod engine;
pub mod error;
pub mod gitref;
pub mod repository;
pub mod resolver;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod transport;

pub use config::ResolverConfig;
pub use context::RequestContext;
pub use credentials::{
    Credential, CredentialStore, EnvSockets, SecretHandle, SocketHandle, SocketProvider,
    StaticCredentials, StaticSockets,
};
pub use engine::{GraphEngine, Identified, LocalEngine};
pub use error::{ResolveError, ResolveResult, Step, TransportError};
pub use gitref::{GitRef, GitTree, RefRequest, TreeOptions};
pub use repository::{
    GitRepository, LocalRepository, RemoteRepository, RepoRequest, RepoSource, RepositoryBackend,
    RepositorySummary,
};
pub use resolver::Resolver;
pub use transport::{AuthConfig, FetchOptions, GitCli, GitTransport};
