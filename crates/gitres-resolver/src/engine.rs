//! The graph evaluation engine seam.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::debug;

use gitres_types::Digest;

use crate::canonical;
use crate::context::RequestContext;
use crate::error::{ResolveError, ResolveResult};
use crate::gitref::{GitRef, GitTree, RefRequest, TreeOptions};
use crate::repository::{GitRepository, RepoRequest};
use crate::resolver::Resolver;

/// A value together with the identity the engine caches it under.
#[derive(Clone, Debug)]
pub struct Identified<T> {
    value: T,
    digest: Digest,
}

impl<T> Identified<T> {
    pub fn new(value: T, digest: Digest) -> Self {
        Self { value, digest }
    }

    /// Returns the same value under another identity.
    pub fn with_digest(self, digest: Digest) -> Self {
        Self { digest, ..self }
    }

    pub fn digest(&self) -> Digest {
        self.digest
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

/// Evaluates resolution requests.
///
/// Redirects re-enter the engine through this trait so each intermediate
/// request is identified and cached on its own.
#[async_trait]
pub trait GraphEngine: Send + Sync {
    async fn resolve_repository(
        &self,
        ctx: &RequestContext,
        request: RepoRequest,
    ) -> ResolveResult<Identified<Arc<GitRepository>>>;

    async fn resolve_ref(
        &self,
        ctx: &RequestContext,
        request: RefRequest,
    ) -> ResolveResult<Identified<GitRef>>;

    async fn common_ancestor(
        &self,
        ctx: &RequestContext,
        a: GitRef,
        b: GitRef,
    ) -> ResolveResult<Identified<GitRef>>;

    async fn tree(
        &self,
        ctx: &RequestContext,
        git_ref: GitRef,
        options: TreeOptions,
    ) -> ResolveResult<Identified<GitTree>>;
}

type ClientKey = (String, Digest);

/// In-process [`GraphEngine`] that caches results.
///
/// Repository and ref resolutions are cached per client: a new client
/// always re-runs resolution and so re-proves access. Trees are shared
/// across clients by canonical identity, which is safe because reaching a
/// tree requires a resolved ref.
pub struct LocalEngine {
    resolver: Resolver,
    repos: Mutex<HashMap<ClientKey, Identified<Arc<GitRepository>>>>,
    refs: Mutex<HashMap<ClientKey, Identified<GitRef>>>,
    trees: Mutex<HashMap<Digest, Identified<GitTree>>>,
    tree_index: Mutex<HashMap<(Digest, TreeOptions), Digest>>,
}

impl LocalEngine {
    pub fn new(resolver: Resolver) -> Self {
        Self {
            resolver,
            repos: Mutex::new(HashMap::new()),
            refs: Mutex::new(HashMap::new()),
            trees: Mutex::new(HashMap::new()),
            tree_index: Mutex::new(HashMap::new()),
        }
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Short names of the repository's tags matching `patterns`.
    pub async fn tags(
        &self,
        ctx: &RequestContext,
        request: RepoRequest,
        patterns: &[String],
    ) -> ResolveResult<Vec<String>> {
        let ctx = &self.scoped(ctx);
        self.run(ctx, self.resolver.tags(self, ctx, request, patterns)).await
    }

    /// Short names of the repository's branches matching `patterns`.
    pub async fn branches(
        &self,
        ctx: &RequestContext,
        request: RepoRequest,
        patterns: &[String],
    ) -> ResolveResult<Vec<String>> {
        let ctx = &self.scoped(ctx);
        self.run(ctx, self.resolver.branches(self, ctx, request, patterns)).await
    }

    /// The highest `v`-prefixed semver tag, resolved as a ref.
    pub async fn latest_version(
        &self,
        ctx: &RequestContext,
        request: RepoRequest,
    ) -> ResolveResult<Identified<GitRef>> {
        let ctx = &self.scoped(ctx);
        self.run(ctx, self.resolver.latest_version(self, ctx, request)).await
    }

    /// `ctx` with a deadline. A top-level request starts the clock; every
    /// request issued on its behalf inherits the same deadline.
    fn scoped(&self, ctx: &RequestContext) -> RequestContext {
        ctx.clone()
            .with_deadline_after(self.resolver.config().request_timeout)
    }

    /// Race `fut` against cancellation and the context's deadline.
    async fn run<T, F>(&self, ctx: &RequestContext, fut: F) -> ResolveResult<T>
    where
        F: Future<Output = ResolveResult<T>>,
    {
        ctx.check_cancelled()?;
        let timeout = self.resolver.config().request_timeout;
        let deadline = ctx.deadline().unwrap_or_else(|| Instant::now() + timeout);
        tokio::select! {
            _ = ctx.cancellation().cancelled() => Err(ResolveError::Cancelled),
            result = tokio::time::timeout_at(deadline, fut) => match result {
                Ok(result) => result,
                Err(_) => Err(ResolveError::Timeout(timeout)),
            },
        }
    }
}

fn cached<K, V>(map: &Mutex<HashMap<K, V>>, key: &K) -> Option<V>
where
    K: std::hash::Hash + Eq,
    V: Clone,
{
    map.lock().unwrap_or_else(PoisonError::into_inner).get(key).cloned()
}

fn store<K, V>(map: &Mutex<HashMap<K, V>>, key: K, value: V)
where
    K: std::hash::Hash + Eq,
{
    map.lock().unwrap_or_else(PoisonError::into_inner).insert(key, value);
}

#[async_trait]
impl GraphEngine for LocalEngine {
    async fn resolve_repository(
        &self,
        ctx: &RequestContext,
        request: RepoRequest,
    ) -> ResolveResult<Identified<Arc<GitRepository>>> {
        let key = (ctx.client_id().to_string(), request.identity());
        if let Some(hit) = cached(&self.repos, &key) {
            debug!(client = ctx.client_id(), digest = %hit.digest(), "repository cache hit");
            return Ok(hit);
        }
        let ctx = &self.scoped(ctx);
        let resolved = self
            .run(ctx, self.resolver.resolve_repository(self, ctx, request))
            .await?;
        store(&self.repos, key, resolved.clone());
        Ok(resolved)
    }

    async fn resolve_ref(
        &self,
        ctx: &RequestContext,
        request: RefRequest,
    ) -> ResolveResult<Identified<GitRef>> {
        let key = (ctx.client_id().to_string(), request.identity());
        if let Some(hit) = cached(&self.refs, &key) {
            debug!(client = ctx.client_id(), digest = %hit.digest(), "ref cache hit");
            return Ok(hit);
        }
        let ctx = &self.scoped(ctx);
        let resolved = self.run(ctx, self.resolver.resolve_ref(self, ctx, request)).await?;
        store(&self.refs, key, resolved.clone());
        Ok(resolved)
    }

    async fn common_ancestor(
        &self,
        ctx: &RequestContext,
        a: GitRef,
        b: GitRef,
    ) -> ResolveResult<Identified<GitRef>> {
        let ctx = &self.scoped(ctx);
        self.run(ctx, self.resolver.common_ancestor(self, ctx, a, b)).await
    }

    async fn tree(
        &self,
        ctx: &RequestContext,
        git_ref: GitRef,
        options: TreeOptions,
    ) -> ResolveResult<Identified<GitTree>> {
        let ctx = &self.scoped(ctx);
        let git_ref = if git_ref.is_resolved() {
            git_ref
        } else {
            self.resolve_ref(ctx, git_ref.request().clone()).await?.into_inner()
        };

        let index_key = (canonical::ref_digest(git_ref.reference()), options);
        if let Some(tree) = cached(&self.tree_index, &index_key).and_then(|d| cached(&self.trees, &d)) {
            debug!(digest = %tree.digest(), "tree cache hit");
            return Ok(tree);
        }

        let tree = self
            .run(ctx, self.resolver.tree(self, ctx, git_ref, options))
            .await?;
        let digest = tree.digest();
        let tree = cached(&self.trees, &digest).unwrap_or(tree);
        store(&self.trees, digest, tree.clone());
        store(&self.tree_index, index_key, digest);
        Ok(tree)
    }
}
