//! Deduplicated checksums.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OnceCell;
use tracing::{debug, warn};

use gitres_types::Digest;

use crate::error::ContentHashResult;
use crate::options::ChecksumOptions;
use crate::traits::{BuildBackend, ContentRef, Definition};

/// Metadata key under which unfiltered root digests are persisted.
pub const CONTENT_DIGEST_KEY: &str = "gitres.content-digest";

type Flight = Arc<OnceCell<ContentHashResult<Digest>>>;

/// Computes content digests on top of a [`BuildBackend`].
///
/// Identical requests that overlap in time share a single walk; the
/// in-flight entry is dropped as soon as the walk finishes, so later
/// requests start fresh (or hit the persisted root digest).
pub struct ContentHasher {
    backend: Arc<dyn BuildBackend>,
    in_flight: Mutex<HashMap<String, Flight>>,
}

impl ContentHasher {
    pub fn new(backend: Arc<dyn BuildBackend>) -> Self {
        Self {
            backend,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn backend(&self) -> &Arc<dyn BuildBackend> {
        &self.backend
    }

    /// Digest the files at `subdir` of the output of `definition`.
    ///
    /// An empty `subdir` means the root.
    pub async fn checksum(
        &self,
        definition: &Definition,
        subdir: &str,
        options: &ChecksumOptions,
    ) -> ContentHashResult<Digest> {
        let subdir = if subdir.is_empty() { "/" } else { subdir };
        let content = self.backend.evaluate(definition).await?;
        let key = flight_key(&content, subdir, options);

        let flight = Arc::clone(
            self.flights()
                .entry(key.clone())
                .or_insert_with(|| Arc::new(OnceCell::new())),
        );
        let result = flight
            .get_or_init(|| self.compute(&content, subdir, options))
            .await
            .clone();

        let mut flights = self.flights();
        if flights.get(&key).is_some_and(|f| Arc::ptr_eq(f, &flight)) {
            flights.remove(&key);
        }
        result
    }

    /// Number of distinct checksum keys currently being computed.
    pub fn in_flight(&self) -> usize {
        self.flights().len()
    }

    fn flights(&self) -> std::sync::MutexGuard<'_, HashMap<String, Flight>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn compute(
        &self,
        content: &ContentRef,
        subdir: &str,
        options: &ChecksumOptions,
    ) -> ContentHashResult<Digest> {
        let unfiltered_root = subdir == "/" && options.is_unfiltered();

        if unfiltered_root {
            if let Some(stored) = self.backend.metadata(content, CONTENT_DIGEST_KEY).await? {
                match stored.parse::<Digest>() {
                    Ok(digest) => {
                        debug!(content = %content, digest = %digest, "reusing persisted content digest");
                        return Ok(digest);
                    }
                    Err(e) => {
                        warn!(content = %content, error = %e, "ignoring malformed persisted digest");
                    }
                }
            }
        }

        self.backend.finalize(content).await?;
        let digest = self.backend.checksum(content, subdir, options).await?;
        debug!(content = %content, subdir, digest = %digest, "computed content digest");

        if unfiltered_root {
            self.backend
                .set_metadata(content, CONTENT_DIGEST_KEY, &digest.to_string())
                .await?;
        }
        Ok(digest)
    }
}

fn flight_key(content: &ContentRef, subdir: &str, options: &ChecksumOptions) -> String {
    [
        content.id(),
        subdir.trim_start_matches('/'),
        &options.key().to_hex(),
    ]
    .join("\0")
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::ContentHashError;
    use crate::memory::{MemoryBackend, Tree};

    fn sample_tree() -> Tree {
        Tree::new()
            .with_file("README.md", "hello")
            .with_file("src/lib.rs", "pub fn f() {}")
            .with_file(".git/HEAD", "ref: refs/heads/main")
    }

    fn setup() -> (Arc<MemoryBackend>, ContentHasher, Definition) {
        let backend = Arc::new(MemoryBackend::new());
        backend.insert("commit-a", sample_tree());
        let hasher = ContentHasher::new(backend.clone());
        (backend, hasher, Definition::new("commit-a"))
    }

    #[tokio::test]
    async fn concurrent_identical_requests_share_one_walk() {
        let (backend, hasher, def) = setup();
        backend.set_delay(Duration::from_millis(50));
        let options = ChecksumOptions::new().with_exclude([".git"]);

        let calls = (0..8).map(|_| hasher.checksum(&def, "/", &options));
        let results = futures::future::join_all(calls).await;

        assert_eq!(backend.checksum_calls(), 1);
        let first = results[0].clone().unwrap();
        assert!(results.iter().all(|r| r.as_ref() == Ok(&first)));
        assert_eq!(hasher.in_flight(), 0);
    }

    #[tokio::test]
    async fn concurrent_waiters_share_the_error() {
        let (backend, hasher, def) = setup();
        backend.set_delay(Duration::from_millis(20));

        let options = ChecksumOptions::new();
        let calls = (0..4).map(|_| hasher.checksum(&def, "missing", &options));
        let results = futures::future::join_all(calls).await;

        assert_eq!(backend.checksum_calls(), 1);
        for result in &results {
            assert!(matches!(result, Err(ContentHashError::Hash(_))));
        }
        assert_eq!(results[0], results[3]);
    }

    #[tokio::test]
    async fn different_options_are_not_merged() {
        let (backend, hasher, def) = setup();
        let plain = ChecksumOptions::new();
        let filtered = ChecksumOptions::new().with_exclude([".git"]);

        let (a, b) = tokio::join!(
            hasher.checksum(&def, "/", &plain),
            hasher.checksum(&def, "/", &filtered)
        );
        assert_ne!(a.unwrap(), b.unwrap());
        assert_eq!(backend.checksum_calls(), 2);
    }

    #[tokio::test]
    async fn unfiltered_root_digest_is_persisted_and_reused() {
        let (backend, hasher, def) = setup();
        let first = hasher.checksum(&def, "", &ChecksumOptions::new()).await.unwrap();
        assert_eq!(backend.checksum_calls(), 1);

        let content = backend.evaluate(&def).await.unwrap();
        assert_eq!(
            backend.metadata(&content, CONTENT_DIGEST_KEY).await.unwrap(),
            Some(first.to_string())
        );

        let second = hasher.checksum(&def, "/", &ChecksumOptions::new()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(backend.checksum_calls(), 1);
    }

    #[tokio::test]
    async fn filtered_or_nested_digests_are_not_persisted() {
        let (backend, hasher, def) = setup();
        let content = backend.evaluate(&def).await.unwrap();

        hasher
            .checksum(&def, "/", &ChecksumOptions::new().with_exclude([".git"]))
            .await
            .unwrap();
        hasher.checksum(&def, "src", &ChecksumOptions::new()).await.unwrap();

        assert_eq!(backend.metadata(&content, CONTENT_DIGEST_KEY).await.unwrap(), None);
        assert_eq!(backend.finalize_calls(), 2);
    }

    #[test]
    fn subdir_spelling_shares_a_key() {
        let content = ContentRef::new(Definition::new("commit-a").digest().to_hex());
        let options = ChecksumOptions::new();
        assert_eq!(
            flight_key(&content, "/src", &options),
            flight_key(&content, "src", &options)
        );
    }

    #[tokio::test]
    async fn unknown_source_is_a_build_error() {
        let (_, hasher, _) = setup();
        let err = hasher
            .checksum(&Definition::new("nope"), "/", &ChecksumOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ContentHashError::Build(_)));
    }
}
