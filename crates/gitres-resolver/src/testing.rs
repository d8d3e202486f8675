//! In-memory transport for exercising resolution without a network.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;

use gitres_contenthash::Definition;
use gitres_types::GitUrl;

use crate::error::TransportError;
use crate::transport::{checkout_definition, AuthConfig, FetchOptions, GitTransport};

/// Who may list a fake remote.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Access {
    Public,
    /// Only callers using one of these auth methods (see
    /// [`AuthConfig::method`]).
    Private(Vec<&'static str>),
}

#[derive(Clone, Debug)]
struct FakeRemote {
    advertisement: String,
    access: Access,
}

/// A [`GitTransport`] serving canned advertisements.
///
/// Remotes are keyed by their canonical remote string
/// (`https://host/path`, `ssh://git@host/path`). Every `ls-remote` call is
/// recorded as `"<remote> <auth method>"`.
#[derive(Default)]
pub struct FakeTransport {
    remotes: RwLock<HashMap<String, FakeRemote>>,
    merge_bases: RwLock<HashMap<(String, String), String>>,
    calls: Mutex<Vec<String>>,
    delay: RwLock<Duration>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_remote(&self, remote: &str, advertisement: impl Into<String>, access: Access) {
        self.remotes.write().unwrap_or_else(PoisonError::into_inner).insert(
            remote.to_string(),
            FakeRemote {
                advertisement: advertisement.into(),
                access,
            },
        );
    }

    pub fn add_merge_base(&self, a: &str, b: &str, base: &str) {
        let mut bases = self.merge_bases.write().unwrap_or_else(PoisonError::into_inner);
        bases.insert((a.to_string(), b.to_string()), base.to_string());
        bases.insert((b.to_string(), a.to_string()), base.to_string());
    }

    /// Make every `ls-remote` take at least `delay`.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.write().unwrap_or_else(PoisonError::into_inner) = delay;
    }

    /// `ls-remote` calls so far, oldest first.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl GitTransport for FakeTransport {
    async fn ls_remote(&self, url: &GitUrl, auth: &AuthConfig) -> Result<String, TransportError> {
        let key = url.remote();
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(format!("{key} {}", auth.method()));

        let delay = *self.delay.read().unwrap_or_else(PoisonError::into_inner);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let remote = self
            .remotes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
            .ok_or_else(|| TransportError::NotFound(format!("Repository not found: {key}")))?;
        match &remote.access {
            Access::Public => Ok(remote.advertisement),
            Access::Private(methods) if methods.contains(&auth.method()) => Ok(remote.advertisement),
            Access::Private(_) => Err(TransportError::Auth(format!("Authentication failed for {key}"))),
        }
    }

    async fn merge_base(
        &self,
        _url: &GitUrl,
        _auth: &AuthConfig,
        a: &str,
        b: &str,
    ) -> Result<String, TransportError> {
        self.merge_bases
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(a.to_string(), b.to_string()))
            .cloned()
            .ok_or_else(|| TransportError::NotFound(format!("no common ancestor of {a} and {b}")))
    }

    async fn fetch(
        &self,
        url: &GitUrl,
        auth: &AuthConfig,
        sha: &str,
        options: &FetchOptions,
    ) -> Result<Definition, TransportError> {
        Ok(checkout_definition(url, auth, sha, options))
    }
}
