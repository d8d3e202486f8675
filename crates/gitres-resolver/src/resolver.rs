//! Redirect-based repository and ref resolution.
//!
//! A repository request moves through a small state machine:
//!
//! ```text
//! Ambiguous ──▶ NoAuth ──▶ Leaf ──▶ Resolved
//!     └──────────────────────▲
//! ```
//!
//! Every transition except the last is a redirect: a fresh request issued
//! through the [`GraphEngine`], so each intermediate state is cached under
//! its own identity. Local working copies resolve immediately.

use std::sync::Arc;

use semver::Version;
use tracing::{debug, info};

use gitres_contenthash::{ChecksumOptions, ContentHasher};
use gitres_refs::{is_commit_sha, Remote};
use gitres_types::{GitUrl, Protocol};

use crate::canonical;
use crate::config::ResolverConfig;
use crate::context::RequestContext;
use crate::credentials::{Credential, CredentialStore, SocketProvider};
use crate::engine::{GraphEngine, Identified};
use crate::error::{ResolveError, ResolveResult, Step, StepExt};
use crate::gitref::{GitRef, GitTree, RefRequest, TreeOptions};
use crate::repository::{GitRepository, RedirectAuth, RepoRequest, RepoSource, RepositoryBackend};
use crate::transport::{AuthConfig, FetchOptions, GitTransport};

/// Protocols tried, in order, for a URL without a scheme.
const AMBIGUOUS_CANDIDATES: [Protocol; 2] = [Protocol::Https, Protocol::Ssh];

/// Paths left out of tree content digests.
const GIT_DIR_PATTERNS: [&str; 2] = [".git", ".git/**"];

const VERSION_TAG_PATTERN: &str = "refs/tags/v*";

/// The version a `v`-prefixed tag names. `v1` and `v1.2` are shorthand
/// for `v1.0.0` and `v1.2.0`.
fn version_of(tag: &str) -> Option<Version> {
    let version = tag.strip_prefix('v')?;
    if let Ok(parsed) = Version::parse(version) {
        return Some(parsed);
    }
    let padded = match version.split('.').count() {
        1 => format!("{version}.0.0"),
        2 => format!("{version}.0"),
        _ => return None,
    };
    Version::parse(&padded).ok()
}

enum State<'a> {
    Local,
    Ambiguous(&'a str),
    NoAuth(&'a GitUrl),
    Leaf(&'a GitUrl),
}

fn state(repo: &GitRepository) -> State<'_> {
    let remote = match repo.backend() {
        RepositoryBackend::Local(_) => return State::Local,
        RepositoryBackend::Remote(remote) => remote,
    };
    let Some(url) = remote.url() else {
        return match &repo.request().source {
            RepoSource::Remote(raw) => State::Ambiguous(raw),
            RepoSource::Local(_) => State::Local,
        };
    };
    let needs_auth = match url.protocol() {
        Protocol::Ssh => remote.ssh_auth_socket().is_none(),
        Protocol::Http | Protocol::Https => !remote.has_auth_token() && !remote.has_auth_header(),
        Protocol::Git | Protocol::File => false,
    };
    if needs_auth {
        State::NoAuth(url)
    } else {
        State::Leaf(url)
    }
}

/// Drives resolution against a transport, a content hasher and the
/// caller's credential sources.
pub struct Resolver {
    transport: Arc<dyn GitTransport>,
    hasher: Arc<ContentHasher>,
    credentials: Option<Arc<dyn CredentialStore>>,
    sockets: Option<Arc<dyn SocketProvider>>,
    config: ResolverConfig,
}

impl Resolver {
    pub fn new(
        transport: Arc<dyn GitTransport>,
        hasher: Arc<ContentHasher>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            transport,
            hasher,
            credentials: None,
            sockets: None,
            config,
        }
    }

    pub fn with_credentials(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.credentials = Some(store);
        self
    }

    pub fn with_sockets(mut self, sockets: Arc<dyn SocketProvider>) -> Self {
        self.sockets = Some(sockets);
        self
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn hasher(&self) -> &Arc<ContentHasher> {
        &self.hasher
    }

    /// Advance `request` one step, redirecting through `engine` until a
    /// leaf resolves it.
    pub async fn resolve_repository(
        &self,
        engine: &dyn GraphEngine,
        ctx: &RequestContext,
        request: RepoRequest,
    ) -> ResolveResult<Identified<Arc<GitRepository>>> {
        ctx.check_cancelled()?;
        let repo = GitRepository::from_request(request)?;
        match state(&repo) {
            State::Local => {
                let digest = repo.request().identity();
                Ok(Identified::new(Arc::new(repo.resolve_with(None)), digest))
            }
            State::Ambiguous(raw) => self.infer_protocol(engine, ctx, &repo, raw).await,
            State::NoAuth(url) => self.attach_credentials(engine, ctx, &repo, url).await,
            State::Leaf(url) => self.resolve_leaf(engine, ctx, &repo, url).await,
        }
    }

    async fn infer_protocol(
        &self,
        engine: &dyn GraphEngine,
        ctx: &RequestContext,
        repo: &GitRepository,
        raw: &str,
    ) -> ResolveResult<Identified<Arc<GitRepository>>> {
        let request = repo.request();
        if request.ssh_auth_socket.is_some() {
            let url = self.candidate(Protocol::Ssh, raw).step(Step::ProtocolInference)?;
            return self.redirect(engine, ctx, request, &url, None).await;
        }
        if request.http_auth_token.is_some() || request.http_auth_header.is_some() {
            let url = self.candidate(Protocol::Https, raw).step(Step::ProtocolInference)?;
            return self.redirect(engine, ctx, request, &url, None).await;
        }

        let mut failures = Vec::with_capacity(AMBIGUOUS_CANDIDATES.len());
        for protocol in AMBIGUOUS_CANDIDATES {
            let url = self.candidate(protocol, raw).step(Step::ProtocolInference)?;
            match self.redirect(engine, ctx, request, &url, None).await {
                Ok(resolved) => return Ok(resolved),
                Err(e) if e.is_auth() => {
                    debug!(url = %url, error = %e, "candidate protocol refused, trying next");
                    failures.push(format!("{url}: {e}"));
                }
                Err(e) => return Err(e),
            }
        }
        Err(ResolveError::Auth(format!(
            "could not access {raw} over https or ssh ({})",
            failures.join("; ")
        )))
        .step(Step::ProtocolInference)
    }

    fn candidate(&self, protocol: Protocol, raw: &str) -> ResolveResult<GitUrl> {
        let raw = raw.trim_start_matches('/');
        let has_user = raw.split('/').next().is_some_and(|authority| authority.contains('@'));
        let url = match protocol {
            Protocol::Ssh if !has_user => format!("ssh://{}@{raw}", self.config.default_ssh_user),
            other => format!("{other}://{raw}"),
        };
        Ok(GitUrl::parse(&url)?)
    }

    async fn attach_credentials(
        &self,
        engine: &dyn GraphEngine,
        ctx: &RequestContext,
        repo: &GitRepository,
        url: &GitUrl,
    ) -> ResolveResult<Identified<Arc<GitRepository>>> {
        let request = repo.request();
        if url.protocol() == Protocol::Ssh {
            let url = url.with_default_user(&self.config.default_ssh_user);
            let socket = match &self.sockets {
                Some(sockets) => sockets
                    .ssh_auth_socket(ctx.client_id())
                    .await
                    .step(Step::CredentialLookup)?,
                None => None,
            };
            let Some(socket) = socket else {
                return Err(ResolveError::Auth(format!(
                    "{url} needs an ssh agent socket and client {} exposes none",
                    ctx.client_id()
                )))
                .step(Step::CredentialLookup);
            };
            return self
                .redirect(engine, ctx, request, &url, Some(RedirectAuth::Socket(socket)))
                .await;
        }

        match self.stored_credential(ctx, url).await {
            Some(credential) => {
                let auth = RedirectAuth::Token {
                    username: Some(credential.username).filter(|u| !u.is_empty()),
                    token: credential.secret,
                };
                self.redirect(engine, ctx, request, url, Some(auth)).await
            }
            // assume the repository is public; the leaf call has the final word
            None => self.resolve_leaf(engine, ctx, repo, url).await,
        }
    }

    /// The caller's stored credential for `url`. Failures count as absence.
    async fn stored_credential(&self, ctx: &RequestContext, url: &GitUrl) -> Option<Credential> {
        if !ctx.is_authoring_client() {
            debug!(
                client = ctx.client_id(),
                author = ctx.authoring_client_id(),
                "not consulting credential store on behalf of another client"
            );
            return None;
        }
        let store = self.credentials.as_ref()?;
        match store
            .lookup(url.protocol().as_str(), url.host(), url.path())
            .await
        {
            Ok(found) => {
                if found.is_none() {
                    debug!(url = %url, "no stored credential");
                }
                found
            }
            Err(e) => {
                debug!(url = %url, error = %e, "credential lookup failed, continuing without auth");
                None
            }
        }
    }

    async fn resolve_leaf(
        &self,
        engine: &dyn GraphEngine,
        ctx: &RequestContext,
        repo: &GitRepository,
        url: &GitUrl,
    ) -> ResolveResult<Identified<Arc<GitRepository>>> {
        if url.protocol() == Protocol::Ssh && url.user().is_none() {
            let url = url.with_default_user(&self.config.default_ssh_user);
            return self.redirect(engine, ctx, repo.request(), &url, None).await;
        }
        let Some(remote) = repo.as_remote() else {
            return Err(ResolveError::InvalidInput("leaf resolution of a local repository".into()));
        };

        ctx.check_cancelled()?;
        let auth = remote.auth_config();
        let advertisement = self
            .transport
            .ls_remote(url, &auth)
            .await
            .step(Step::LeafFetch)?;
        let refs = Remote::parse(&advertisement);
        let count = refs.len();

        let resolved = repo.resolve_with(Some(refs));
        let digest = resolved
            .as_remote()
            .map(|remote| canonical::repository_digest(remote, resolved.discard_git_dir()))
            .unwrap_or_else(|| resolved.request().identity());
        info!(
            url = %url.redacted(),
            auth = auth.method(),
            refs = count,
            digest = %digest,
            "resolved repository"
        );
        Ok(Identified::new(Arc::new(resolved), digest))
    }

    async fn redirect(
        &self,
        engine: &dyn GraphEngine,
        ctx: &RequestContext,
        request: &RepoRequest,
        url: &GitUrl,
        auth: Option<RedirectAuth>,
    ) -> ResolveResult<Identified<Arc<GitRepository>>> {
        let next_ctx = ctx.redirected(self.config.max_redirects)?;
        debug!(
            url = %url.redacted(),
            hop = next_ctx.hops(),
            with_auth = auth.is_some(),
            "redirecting"
        );
        engine
            .resolve_repository(&next_ctx, request.redirect(url.remote(), auth))
            .await
    }

    /// Resolve the owning repository, then the ref within it.
    pub async fn resolve_ref(
        &self,
        engine: &dyn GraphEngine,
        ctx: &RequestContext,
        request: RefRequest,
    ) -> ResolveResult<Identified<GitRef>> {
        let placeholder = GitRef::from_request(request.clone())?;
        let repo = engine
            .resolve_repository(ctx, request.repo.clone())
            .await
            .step(Step::RepositoryResolution)?
            .into_inner();
        let bound = placeholder.rebind(Arc::clone(&repo));

        let index = self.ref_index(&repo).await?;
        let mut found = index.lookup(request.lookup_target()).step(Step::RefLookup)?;
        let pinned = &request.target;
        if !pinned.name.is_empty() && !pinned.sha.is_empty() {
            if !is_commit_sha(&pinned.sha) {
                return Err(ResolveError::InvalidInput(format!(
                    "invalid commit SHA: {:?}",
                    pinned.sha
                )));
            }
            found = found.with_sha(pinned.sha.clone());
        }

        let digest = canonical::ref_digest(&found);
        debug!(lookup = request.lookup_target(), name = %found.name, sha = %found.sha, "resolved ref");
        Ok(Identified::new(bound.resolved_as(found), digest))
    }

    /// The ref index of a resolved repository. Local working copies are
    /// listed on demand.
    async fn ref_index(&self, repo: &GitRepository) -> ResolveResult<Arc<Remote>> {
        match repo.backend() {
            RepositoryBackend::Remote(_) => repo.refs().cloned().ok_or_else(|| {
                ResolveError::InvalidInput("repository has not been resolved".into())
            }),
            RepositoryBackend::Local(local) => {
                let url = local.url()?;
                let advertisement = self
                    .transport
                    .ls_remote(&url, &AuthConfig::none())
                    .await
                    .step(Step::LeafFetch)?;
                let refs = Remote::parse(&advertisement);
                Ok(Arc::new(match repo.request().pinned_head() {
                    Some(head) => refs.with_head(head),
                    None => refs,
                }))
            }
        }
    }

    /// URL and credentials to reach a resolved repository with.
    fn endpoint(&self, repo: &GitRepository) -> ResolveResult<(GitUrl, AuthConfig)> {
        match repo.backend() {
            RepositoryBackend::Remote(remote) => {
                let url = remote.url().cloned().ok_or_else(|| {
                    ResolveError::InvalidInput("repository URL is still ambiguous".into())
                })?;
                Ok((url, remote.auth_config()))
            }
            RepositoryBackend::Local(local) => Ok((local.url()?, AuthConfig::none())),
        }
    }

    /// The best common ancestor of two refs, as an unnamed ref.
    ///
    /// Unresolved operands are resolved first and the request is issued
    /// again with the resolved operand in its place.
    pub async fn common_ancestor(
        &self,
        engine: &dyn GraphEngine,
        ctx: &RequestContext,
        a: GitRef,
        b: GitRef,
    ) -> ResolveResult<Identified<GitRef>> {
        if !a.is_resolved() {
            let a = engine.resolve_ref(ctx, a.request().clone()).await?.into_inner();
            return engine.common_ancestor(ctx, a, b).await;
        }
        if !b.is_resolved() {
            let b = engine.resolve_ref(ctx, b.request().clone()).await?.into_inner();
            return engine.common_ancestor(ctx, a, b).await;
        }

        let (Some(left), Some(right)) = (a.commit(), b.commit()) else {
            return Err(ResolveError::InvalidRef(format!(
                "{} or {} has no commit",
                a.ref_name(),
                b.ref_name()
            )));
        };
        let (url, auth) = self.endpoint(a.repository())?;
        let base = self
            .transport
            .merge_base(&url, &auth, left, right)
            .await
            .step(Step::MergeBase)?;
        let base = base.trim();
        if !is_commit_sha(base) {
            return Err(ResolveError::InvalidRef(format!("merge-base returned {base:?}")))
                .step(Step::MergeBase);
        }

        let ancestor = GitRef::unnamed(Arc::clone(a.repository()), base);
        let digest = canonical::ref_digest(ancestor.reference());
        Ok(Identified::new(ancestor, digest))
    }

    /// Check out `git_ref` and digest its files, `.git` excluded.
    pub async fn tree(
        &self,
        engine: &dyn GraphEngine,
        ctx: &RequestContext,
        git_ref: GitRef,
        options: TreeOptions,
    ) -> ResolveResult<Identified<GitTree>> {
        let git_ref = if git_ref.is_resolved() {
            git_ref
        } else {
            engine.resolve_ref(ctx, git_ref.request().clone()).await?.into_inner()
        };
        let sha = git_ref
            .commit()
            .ok_or_else(|| ResolveError::InvalidRef(format!("{} has no commit", git_ref.ref_name())))?;

        let (url, auth) = self.endpoint(git_ref.repository())?;
        let fetch = FetchOptions {
            keep_git_dir: !options.discard_git_dir,
            depth: options.depth,
        };
        let definition = self
            .transport
            .fetch(&url, &auth, sha, &fetch)
            .await
            .step(Step::TreeFetch)?;

        ctx.check_cancelled()?;
        let checksum = ChecksumOptions::new()
            .with_follow_links(false)
            .with_exclude(GIT_DIR_PATTERNS);
        let content = self
            .hasher
            .checksum(&definition, "", &checksum)
            .await
            .step(Step::ContentHash)?;

        let digest = canonical::tree_digest(&content, options.discard_git_dir, options.depth);
        debug!(sha, content = %content, digest = %digest, "digested tree");
        Ok(Identified::new(
            GitTree {
                definition,
                content,
                options,
            },
            digest,
        ))
    }

    /// Short names of the tags matching `patterns` (all tags when empty).
    pub async fn tags(
        &self,
        engine: &dyn GraphEngine,
        ctx: &RequestContext,
        request: RepoRequest,
        patterns: &[String],
    ) -> ResolveResult<Vec<String>> {
        Ok(self
            .listing(engine, ctx, request)
            .await?
            .filter(patterns)
            .tags()
            .short_names())
    }

    /// Short names of the branches matching `patterns` (all when empty).
    pub async fn branches(
        &self,
        engine: &dyn GraphEngine,
        ctx: &RequestContext,
        request: RepoRequest,
        patterns: &[String],
    ) -> ResolveResult<Vec<String>> {
        Ok(self
            .listing(engine, ctx, request)
            .await?
            .filter(patterns)
            .branches()
            .short_names())
    }

    /// The tag with the highest semantic version, resolved as a ref.
    ///
    /// Only `v`-prefixed tags take part. Tags that are not valid versions
    /// are skipped.
    pub async fn latest_version(
        &self,
        engine: &dyn GraphEngine,
        ctx: &RequestContext,
        request: RepoRequest,
    ) -> ResolveResult<Identified<GitRef>> {
        let tag = self
            .listing(engine, ctx, request.clone())
            .await?
            .tags()
            .filter(&[VERSION_TAG_PATTERN])
            .short_names()
            .into_iter()
            .filter_map(|tag| version_of(&tag).map(|version| (version, tag)))
            .max()
            .map(|(_, tag)| tag)
            .ok_or_else(|| ResolveError::NotFound("no valid semver tags found".into()))?;
        debug!(tag = %tag, "latest version");
        engine.resolve_ref(ctx, RefRequest::tag(request, &tag)?).await
    }

    async fn listing(
        &self,
        engine: &dyn GraphEngine,
        ctx: &RequestContext,
        request: RepoRequest,
    ) -> ResolveResult<Arc<Remote>> {
        let repo = engine
            .resolve_repository(ctx, request)
            .await
            .step(Step::RepositoryResolution)?
            .into_inner();
        self.ref_index(&repo).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{SecretHandle, SocketHandle, StaticCredentials, StaticSockets};
    use crate::engine::LocalEngine;
    use crate::repository::RepositorySummary;
    use crate::testing::{Access, FakeTransport};
    use gitres_contenthash::{MemoryBackend, Tree};
    use gitres_refs::Ref;

    const MAIN: &str = "1111111111111111111111111111111111111111";
    const TAG_OBJECT: &str = "2222222222222222222222222222222222222222";
    const TAG_COMMIT: &str = "3333333333333333333333333333333333333333";
    const DEV: &str = "4444444444444444444444444444444444444444";
    const BASE: &str = "5555555555555555555555555555555555555555";

    fn advertisement() -> String {
        format!(
            "ref: refs/heads/main\tHEAD\n\
             {MAIN}\tHEAD\n\
             {DEV}\trefs/heads/dev\n\
             {MAIN}\trefs/heads/main\n\
             {TAG_OBJECT}\trefs/tags/v1.0.0\n\
             {TAG_COMMIT}\trefs/tags/v1.0.0^{{}}\n"
        )
    }

    struct Fixture {
        transport: Arc<FakeTransport>,
        backend: Arc<MemoryBackend>,
        sockets: Arc<StaticSockets>,
        credentials: Arc<StaticCredentials>,
        engine: LocalEngine,
    }

    fn fixture() -> Fixture {
        fixture_with(ResolverConfig::default())
    }

    fn fixture_with(config: ResolverConfig) -> Fixture {
        let transport = Arc::new(FakeTransport::new());
        let backend = Arc::new(MemoryBackend::new());
        let sockets = Arc::new(StaticSockets::new());
        let credentials = Arc::new(StaticCredentials::new());
        let hasher = Arc::new(ContentHasher::new(backend.clone()));
        let resolver = Resolver::new(transport.clone(), hasher, config)
            .with_sockets(sockets.clone())
            .with_credentials(credentials.clone());
        Fixture {
            transport,
            backend,
            sockets,
            credentials,
            engine: LocalEngine::new(resolver),
        }
    }

    fn alice() -> RequestContext {
        RequestContext::new("alice")
    }

    fn token() -> SecretHandle {
        SecretHandle::new("token-1", "ghp_example")
    }

    fn socket() -> SocketHandle {
        SocketHandle::new("sock-1", "/tmp/agent.sock")
    }

    fn main_of(repo: RepoRequest) -> GitRef {
        GitRef::from_request(RefRequest::branch(repo, "main").unwrap()).unwrap()
    }

    #[tokio::test]
    async fn url_spellings_converge() {
        let fx = fixture();
        fx.transport.add_remote("https://h/org/r", advertisement(), Access::Public);

        let bare = fx
            .engine
            .resolve_repository(&alice(), RepoRequest::remote("h/org/r"))
            .await
            .unwrap();
        let explicit = fx
            .engine
            .resolve_repository(&alice(), RepoRequest::remote("https://h/org/r"))
            .await
            .unwrap();

        assert_eq!(bare.digest(), explicit.digest());
        assert!(bare.value().is_resolved());
        assert_eq!(bare.value().url().as_deref(), Some("https://h/org/r"));
        assert_eq!(bare.value().head(), Some(Ref::new("refs/heads/main", MAIN)));
    }

    #[tokio::test]
    async fn summary_serializes() {
        let fx = fixture();
        fx.transport.add_remote("https://h/r", advertisement(), Access::Public);
        let repo = fx
            .engine
            .resolve_repository(&alice(), RepoRequest::remote("https://h/r"))
            .await
            .unwrap();
        let json = serde_json::to_value(RepositorySummary::from(&**repo.value())).unwrap();
        assert_eq!(json["url"], "https://h/r");
        assert_eq!(json["head"]["sha"], MAIN);
        assert_eq!(json["resolved"], true);
    }

    #[tokio::test]
    async fn ambiguous_url_tries_https_before_ssh() {
        let fx = fixture();
        fx.sockets.insert("alice", "/tmp/alice.sock");
        fx.transport
            .add_remote("https://h/r", advertisement(), Access::Private(vec!["http-token"]));
        fx.transport
            .add_remote("ssh://git@h/r", advertisement(), Access::Private(vec!["ssh-agent"]));

        let resolved = fx
            .engine
            .resolve_repository(&alice(), RepoRequest::remote("h/r"))
            .await
            .unwrap();

        assert_eq!(
            fx.transport.calls(),
            vec!["https://h/r none".to_string(), "ssh://git@h/r ssh-agent".to_string()]
        );
        assert_eq!(resolved.value().url().as_deref(), Some("ssh://git@h/r"));
    }

    #[tokio::test]
    async fn explicit_auth_picks_the_protocol() {
        let fx = fixture();
        fx.transport.add_remote("https://h/r", advertisement(), Access::Public);
        fx.transport.add_remote("ssh://git@h/r", advertisement(), Access::Public);

        fx.engine
            .resolve_repository(&alice(), RepoRequest::remote("h/r").with_ssh_auth_socket(socket()))
            .await
            .unwrap();
        assert_eq!(fx.transport.calls(), vec!["ssh://git@h/r ssh-agent".to_string()]);

        fx.engine
            .resolve_repository(&alice(), RepoRequest::remote("h/r").with_auth_token(token()))
            .await
            .unwrap();
        assert_eq!(fx.transport.calls()[1], "https://h/r http-token");
    }

    #[tokio::test]
    async fn ssh_candidate_keeps_an_explicit_user() {
        let fx = fixture();
        fx.transport.add_remote("ssh://deploy@h/r", advertisement(), Access::Public);

        let resolved = fx
            .engine
            .resolve_repository(
                &alice(),
                RepoRequest::remote("deploy@h/r").with_ssh_auth_socket(socket()),
            )
            .await
            .unwrap();

        assert_eq!(resolved.value().url().as_deref(), Some("ssh://deploy@h/r"));
        assert_eq!(fx.transport.calls(), vec!["ssh://deploy@h/r ssh-agent".to_string()]);
    }

    #[tokio::test]
    async fn exhausting_candidates_names_both() {
        let fx = fixture();
        fx.transport
            .add_remote("https://h/r", advertisement(), Access::Private(vec!["http-token"]));
        fx.transport
            .add_remote("ssh://git@h/r", advertisement(), Access::Private(vec!["ssh-agent"]));

        let err = fx
            .engine
            .resolve_repository(&alice(), RepoRequest::remote("h/r"))
            .await
            .unwrap_err();

        assert!(err.is_auth());
        assert!(matches!(err, ResolveError::Step { step: Step::ProtocolInference, .. }));
        let message = err.to_string();
        assert!(message.contains("https://h/r"), "{message}");
        assert!(message.contains("ssh://git@h/r"), "{message}");
    }

    #[tokio::test]
    async fn non_auth_failure_stops_candidate_trial() {
        let fx = fixture();
        fx.sockets.insert("alice", "/tmp/alice.sock");
        fx.transport.add_remote("ssh://git@h/r", advertisement(), Access::Public);

        let err = fx
            .engine
            .resolve_repository(&alice(), RepoRequest::remote("h/r"))
            .await
            .unwrap_err();

        assert!(!err.is_auth());
        assert!(matches!(err.root(), ResolveError::Transport(_)));
        assert_eq!(fx.transport.calls(), vec!["https://h/r none".to_string()]);
    }

    #[tokio::test]
    async fn public_repo_needs_no_credentials() {
        let fx = fixture();
        fx.transport.add_remote("https://h/r", advertisement(), Access::Public);
        let resolved = fx
            .engine
            .resolve_repository(&alice(), RepoRequest::remote("https://h/r"))
            .await
            .unwrap();
        assert!(resolved.value().is_resolved());
        assert_eq!(fx.transport.calls(), vec!["https://h/r none".to_string()]);
    }

    #[tokio::test]
    async fn private_repo_without_credentials_fails_at_the_leaf() {
        let fx = fixture();
        fx.sockets.insert("alice", "/tmp/alice.sock");
        fx.transport
            .add_remote("https://h/r", advertisement(), Access::Private(vec!["http-token"]));
        fx.transport.add_remote("ssh://git@h/r", advertisement(), Access::Public);

        let err = fx
            .engine
            .resolve_repository(&alice(), RepoRequest::remote("https://h/r"))
            .await
            .unwrap_err();

        assert!(err.is_auth());
        assert!(matches!(err, ResolveError::Step { step: Step::LeafFetch, .. }));
        assert_eq!(fx.transport.calls(), vec!["https://h/r none".to_string()]);
    }

    #[tokio::test]
    async fn credential_store_serves_only_the_authoring_client() {
        let fx = fixture();
        fx.credentials.insert("https", "h", "alice", "s3cret");
        fx.transport
            .add_remote("https://h/r", advertisement(), Access::Private(vec!["http-token"]));

        let resolved = fx
            .engine
            .resolve_repository(&alice(), RepoRequest::remote("https://h/r"))
            .await
            .unwrap();
        assert_eq!(resolved.value().as_remote().unwrap().auth_username(), Some("alice"));
        assert_eq!(fx.transport.calls(), vec!["https://h/r http-token".to_string()]);

        let on_behalf = RequestContext::new("module").with_authoring_client("alice");
        let err = fx
            .engine
            .resolve_repository(&on_behalf, RepoRequest::remote("https://h/r"))
            .await
            .unwrap_err();
        assert!(err.is_auth());
        assert_eq!(fx.transport.calls()[1], "https://h/r none");
    }

    #[tokio::test]
    async fn ssh_requires_a_socket() {
        let fx = fixture();
        fx.transport.add_remote("ssh://git@h/r", advertisement(), Access::Public);

        let err = fx
            .engine
            .resolve_repository(&alice(), RepoRequest::remote("ssh://h/r"))
            .await
            .unwrap_err();
        assert!(err.is_auth());
        assert!(matches!(err, ResolveError::Step { step: Step::CredentialLookup, .. }));
        assert!(fx.transport.calls().is_empty());

        fx.sockets.insert("bob", "/tmp/bob.sock");
        let resolved = fx
            .engine
            .resolve_repository(&RequestContext::new("bob"), RepoRequest::remote("ssh://h/r"))
            .await
            .unwrap();
        assert_eq!(resolved.value().url().as_deref(), Some("ssh://git@h/r"));
        assert_eq!(fx.transport.calls(), vec!["ssh://git@h/r ssh-agent".to_string()]);
    }

    #[tokio::test]
    async fn redirects_are_bounded() {
        let fx = fixture_with(ResolverConfig {
            max_redirects: 1,
            ..ResolverConfig::default()
        });
        fx.credentials.insert("https", "h", "alice", "s3cret");
        fx.transport.add_remote("https://h/r", advertisement(), Access::Public);

        let err = fx
            .engine
            .resolve_repository(&alice(), RepoRequest::remote("h/r"))
            .await
            .unwrap_err();
        assert!(matches!(err.root(), ResolveError::RedirectLimit { limit: 1 }));
        assert!(fx.transport.calls().is_empty());
    }

    #[tokio::test]
    async fn redirects_keep_peripheral_options() {
        let fx = fixture();
        fx.transport.add_remote("https://h/r", advertisement(), Access::Public);
        let resolved = fx
            .engine
            .resolve_repository(
                &alice(),
                RepoRequest::remote("h/r").with_keep_git_dir(true).with_commit(DEV),
            )
            .await
            .unwrap();
        assert!(resolved.value().keep_git_dir());
        assert_eq!(resolved.value().head(), Some(Ref::new("refs/heads/main", DEV)));
    }

    #[tokio::test]
    async fn local_repository_resolves_without_network() {
        let fx = fixture();
        let dir = tempfile::tempdir().unwrap();
        let request = RepoRequest::local(dir.path());

        let resolved = fx
            .engine
            .resolve_repository(&alice(), request.clone())
            .await
            .unwrap();
        assert!(resolved.value().is_resolved());
        assert!(fx.transport.calls().is_empty());

        let url = resolved.value().url().unwrap();
        assert!(url.starts_with("file://"));
        fx.transport.add_remote(&url, advertisement(), Access::Public);
        let main = fx
            .engine
            .resolve_ref(&alice(), RefRequest::branch(request, "main").unwrap())
            .await
            .unwrap();
        assert_eq!(main.value().commit(), Some(MAIN));
    }

    #[tokio::test]
    async fn refs_resolve_to_commits() {
        let fx = fixture();
        fx.transport.add_remote("https://h/r", advertisement(), Access::Public);
        let repo = RepoRequest::remote("https://h/r");

        let tag = fx
            .engine
            .resolve_ref(&alice(), RefRequest::named(repo.clone(), "v1.0.0"))
            .await
            .unwrap();
        assert_eq!(tag.value().reference(), &Ref::new("refs/tags/v1.0.0", TAG_COMMIT));
        assert_eq!(tag.digest(), canonical::ref_digest(tag.value().reference()));
        assert!(tag.value().repository().is_resolved());

        let head = fx
            .engine
            .resolve_ref(&alice(), RefRequest::head(repo.clone()))
            .await
            .unwrap();
        assert_eq!(head.value().reference(), &Ref::new("refs/heads/main", MAIN));

        let commit = fx
            .engine
            .resolve_ref(&alice(), RefRequest::commit(repo, BASE).unwrap())
            .await
            .unwrap();
        assert_eq!(commit.value().reference(), &Ref::commit(BASE));
    }

    #[tokio::test]
    async fn pinned_commits_override_the_remote() {
        let fx = fixture();
        fx.transport.add_remote("https://h/r", advertisement(), Access::Public);
        let repo = RepoRequest::remote("https://h/r");

        let pinned = fx
            .engine
            .resolve_ref(&alice(), RefRequest::branch(repo.clone(), "main").unwrap().with_commit(DEV))
            .await
            .unwrap();
        assert_eq!(pinned.value().reference(), &Ref::new("refs/heads/main", DEV));

        let head = fx
            .engine
            .resolve_ref(&alice(), RefRequest::head(repo.with_commit(DEV)))
            .await
            .unwrap();
        assert_eq!(head.value().reference(), &Ref::new("refs/heads/main", DEV));
    }

    #[tokio::test]
    async fn missing_ref_reports_the_lookup_step() {
        let fx = fixture();
        fx.transport.add_remote("https://h/r", advertisement(), Access::Public);
        let err = fx
            .engine
            .resolve_ref(&alice(), RefRequest::named(RepoRequest::remote("https://h/r"), "nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::Step { step: Step::RefLookup, .. }));
        assert!(matches!(err.root(), ResolveError::NotFound(_)));
    }

    #[tokio::test]
    async fn tags_and_branches_list_short_names() {
        let fx = fixture();
        fx.transport.add_remote("https://h/r", advertisement(), Access::Public);
        let repo = RepoRequest::remote("https://h/r");

        let tags = fx.engine.tags(&alice(), repo.clone(), &[]).await.unwrap();
        assert_eq!(tags, vec!["v1.0.0".to_string()]);

        let branches = fx.engine.branches(&alice(), repo.clone(), &[]).await.unwrap();
        assert_eq!(branches, vec!["dev".to_string(), "main".to_string()]);

        let filtered = fx
            .engine
            .branches(&alice(), repo, &["ma*".to_string()])
            .await
            .unwrap();
        assert_eq!(filtered, vec!["main".to_string()]);
    }

    #[test]
    fn version_tags_parse_with_shorthand() {
        assert_eq!(version_of("v1.2.3"), Some(Version::new(1, 2, 3)));
        assert_eq!(version_of("v1.2"), Some(Version::new(1, 2, 0)));
        assert_eq!(version_of("v1"), Some(Version::new(1, 0, 0)));
        assert!(version_of("v2.0.0-rc.1").is_some());
        for invalid in ["1.2.3", "v01.0.0", "v1.x", "v1.2.3.4", "v1-rc", "version"] {
            assert_eq!(version_of(invalid), None, "{invalid}");
        }
    }

    #[tokio::test]
    async fn latest_version_picks_the_highest_semver_tag() {
        let fx = fixture();
        fx.transport.add_remote(
            "https://h/r",
            format!(
                "{MAIN}\tHEAD\n\
                 {MAIN}\trefs/heads/main\n\
                 {DEV}\trefs/heads/v9.0.0\n\
                 {MAIN}\trefs/tags/release-3.0.0\n\
                 {BASE}\trefs/tags/v1.10.0\n\
                 {MAIN}\trefs/tags/v1.9.3\n\
                 {TAG_OBJECT}\trefs/tags/v2.0.0-rc.1\n\
                 {TAG_COMMIT}\trefs/tags/v2.0.0-rc.1^{{}}\n\
                 {MAIN}\trefs/tags/v3.x\n\
                 {MAIN}\trefs/tags/v01.0.0\n"
            ),
            Access::Public,
        );

        let latest = fx
            .engine
            .latest_version(&alice(), RepoRequest::remote("https://h/r"))
            .await
            .unwrap();
        assert_eq!(
            latest.value().reference(),
            &Ref::new("refs/tags/v2.0.0-rc.1", TAG_COMMIT)
        );
        assert_eq!(latest.digest(), canonical::ref_digest(latest.value().reference()));
    }

    #[tokio::test]
    async fn latest_version_needs_a_version_tag() {
        let fx = fixture();
        fx.transport.add_remote(
            "https://h/r",
            format!("{MAIN}\trefs/heads/main\n{MAIN}\trefs/tags/release-1\n{DEV}\trefs/tags/vnext\n"),
            Access::Public,
        );
        let err = fx
            .engine
            .latest_version(&alice(), RepoRequest::remote("https://h/r"))
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::NotFound(_)));
    }

    #[tokio::test]
    async fn common_ancestor_resolves_its_operands() {
        let fx = fixture();
        fx.transport.add_remote("https://h/r", advertisement(), Access::Public);
        fx.transport.add_merge_base(MAIN, DEV, BASE);
        let repo = RepoRequest::remote("https://h/r");

        let main = main_of(repo.clone());
        let dev = GitRef::from_request(RefRequest::branch(repo, "dev").unwrap()).unwrap();
        let base = fx.engine.common_ancestor(&alice(), main, dev).await.unwrap();

        assert_eq!(base.value().commit(), Some(BASE));
        assert_eq!(base.value().ref_name(), BASE);
        assert!(base.value().is_resolved());
        assert_eq!(base.digest(), canonical::ref_digest(&Ref::commit(BASE)));
    }

    #[tokio::test]
    async fn tree_digest_ignores_credentials() {
        let repos = [
            RepoRequest::remote("ssh://git@h/r").with_ssh_auth_socket(socket()),
            RepoRequest::remote("https://h/r").with_auth_token(token()),
            RepoRequest::remote("https://h/r").with_auth_header(SecretHandle::new("hdr", "Bearer x")),
        ];
        let mut digests = Vec::new();
        for repo in repos {
            let fx = fixture();
            fx.backend.insert(MAIN, Tree::new().with_file("README.md", "hello"));
            fx.transport.add_remote(
                "https://h/r",
                advertisement(),
                Access::Private(vec!["http-token", "http-header"]),
            );
            fx.transport
                .add_remote("ssh://git@h/r", advertisement(), Access::Private(vec!["ssh-agent"]));
            let tree = fx
                .engine
                .tree(&alice(), main_of(repo), TreeOptions::default())
                .await
                .unwrap();
            digests.push(tree.digest());
        }
        assert_eq!(digests[0], digests[1]);
        assert_eq!(digests[1], digests[2]);
    }

    #[tokio::test]
    async fn tree_cache_is_shared_across_clients() {
        let fx = fixture();
        fx.backend.insert(MAIN, Tree::new().with_file("README.md", "hello"));
        fx.transport
            .add_remote("https://h/r", advertisement(), Access::Private(vec!["http-token"]));
        fx.transport
            .add_remote("ssh://git@h/r", advertisement(), Access::Private(vec!["ssh-agent"]));

        let by_token = fx
            .engine
            .tree(
                &alice(),
                main_of(RepoRequest::remote("https://h/r").with_auth_token(token())),
                TreeOptions::default(),
            )
            .await
            .unwrap();
        let by_socket = fx
            .engine
            .tree(
                &RequestContext::new("bob"),
                main_of(RepoRequest::remote("ssh://git@h/r").with_ssh_auth_socket(socket())),
                TreeOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(by_token.digest(), by_socket.digest());
        assert_eq!(fx.backend.checksum_calls(), 1);
        // each client still proved access
        assert_eq!(fx.transport.calls().len(), 2);
    }

    #[tokio::test]
    async fn tree_content_skips_git_dir_and_scopes_options() {
        let fx = fixture();
        fx.backend.insert(
            MAIN,
            Tree::new()
                .with_file("README.md", "hello")
                .with_file(".git/HEAD", "ref: refs/heads/main\n"),
        );
        fx.backend.insert(DEV, Tree::new().with_file("README.md", "hello"));
        fx.transport.add_remote("https://h/r", advertisement(), Access::Public);
        let repo = RepoRequest::remote("https://h/r");

        let main = fx
            .engine
            .tree(&alice(), main_of(repo.clone()), TreeOptions::default())
            .await
            .unwrap();
        let dev = fx
            .engine
            .tree(
                &alice(),
                GitRef::from_request(RefRequest::branch(repo.clone(), "dev").unwrap()).unwrap(),
                TreeOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(main.value().content, dev.value().content);
        assert_eq!(main.digest(), dev.digest());

        let discarded = fx
            .engine
            .tree(
                &alice(),
                main_of(repo),
                TreeOptions {
                    discard_git_dir: true,
                    depth: 1,
                },
            )
            .await
            .unwrap();
        assert_ne!(discarded.digest(), main.digest());
        assert_eq!(
            discarded.digest(),
            canonical::tree_digest(&main.value().content, true, 1)
        );
    }
}
