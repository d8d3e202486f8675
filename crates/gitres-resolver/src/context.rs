//! Request-scoped context threaded through every resolution call.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{ResolveError, ResolveResult};

/// Who is asking, on whose behalf, and for how long.
///
/// A redirect receives a derived context with the same client, the same
/// cancellation token, the same deadline and one more hop on the counter.
#[derive(Clone, Debug)]
pub struct RequestContext {
    client_id: String,
    authoring_client_id: String,
    cancel: CancellationToken,
    deadline: Option<Instant>,
    hops: usize,
}

impl RequestContext {
    /// A context for a request authored by `client_id` itself.
    pub fn new(client_id: impl Into<String>) -> Self {
        let client_id = client_id.into();
        Self {
            authoring_client_id: client_id.clone(),
            client_id,
            cancel: CancellationToken::new(),
            deadline: None,
            hops: 0,
        }
    }

    /// Returns a copy recording that the surrounding request was authored
    /// by another client (e.g. a module calling on behalf of its caller).
    pub fn with_authoring_client(mut self, client_id: impl Into<String>) -> Self {
        self.authoring_client_id = client_id.into();
        self
    }

    /// Returns a copy observing `token`.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Returns a copy that must finish by `deadline`.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Returns a copy that must finish within `timeout` from now, unless a
    /// deadline is already set.
    pub fn with_deadline_after(self, timeout: Duration) -> Self {
        match self.deadline {
            Some(_) => self,
            None => self.with_deadline(Instant::now() + timeout),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn authoring_client_id(&self) -> &str {
        &self.authoring_client_id
    }

    /// The current client authored the surrounding request. Only then may
    /// its credential store be consulted.
    pub fn is_authoring_client(&self) -> bool {
        self.client_id == self.authoring_client_id
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fails with [`ResolveError::Cancelled`] once the token has fired.
    pub fn check_cancelled(&self) -> ResolveResult<()> {
        if self.is_cancelled() {
            return Err(ResolveError::Cancelled);
        }
        Ok(())
    }

    /// Redirects issued so far in this chain.
    pub fn hops(&self) -> usize {
        self.hops
    }

    /// Context for the next redirect, or [`ResolveError::RedirectLimit`]
    /// once `limit` redirects have been issued.
    pub fn redirected(&self, limit: usize) -> ResolveResult<Self> {
        self.check_cancelled()?;
        if self.hops >= limit {
            return Err(ResolveError::RedirectLimit { limit });
        }
        Ok(Self {
            hops: self.hops + 1,
            ..self.clone()
        })
    }
}
