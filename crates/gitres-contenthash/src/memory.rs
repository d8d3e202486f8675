//! In-memory build backend.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};

use gitres_crypto::DomainHasher;
use gitres_types::Digest;

use crate::error::{ContentHashError, ContentHashResult};
use crate::options::ChecksumOptions;
use crate::traits::{BuildBackend, ContentRef, Definition};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// One entry of a [`Tree`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Entry {
    File(Vec<u8>),
    Symlink(String),
}

/// A file tree keyed by `/`-separated relative path. Directories are
/// implied by their contents.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    entries: BTreeMap<String, Entry>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<String>, contents: impl AsRef<[u8]>) -> Self {
        self.entries
            .insert(path.into(), Entry::File(contents.as_ref().to_vec()));
        self
    }

    pub fn with_symlink(mut self, path: impl Into<String>, target: impl Into<String>) -> Self {
        self.entries.insert(path.into(), Entry::Symlink(target.into()));
        self
    }

    pub fn get(&self, path: &str) -> Option<&Entry> {
        self.entries.get(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn digest(&self, subdir: &str, options: &ChecksumOptions) -> ContentHashResult<Digest> {
        let include = compile(&options.include)?;
        let exclude = compile(&options.exclude)?;
        let root = subdir.trim_matches('/');
        let root_pattern = if options.wildcard && !root.is_empty() {
            Some(compile_one(root)?)
        } else {
            None
        };

        let mut found = root.is_empty();
        let mut listing = Vec::new();
        for (path, entry) in &self.entries {
            let rel = match &root_pattern {
                Some(pattern) => self_or_ancestor_matches(pattern, path).then_some(path.as_str()),
                None if root.is_empty() => Some(path.as_str()),
                None => path.strip_prefix(root).and_then(|r| r.strip_prefix('/')),
            };
            let Some(rel) = rel else { continue };
            found = true;

            if exclude.iter().any(|p| self_or_ancestor_matches(p, rel)) {
                continue;
            }
            if !include.is_empty() && !include.iter().any(|p| self_or_ancestor_matches(p, rel)) {
                continue;
            }

            let (kind, leaf) = self.leaf_digest(path, entry, options.follow_links);
            listing.extend_from_slice(rel.as_bytes());
            listing.push(0);
            listing.extend_from_slice(kind.as_bytes());
            listing.push(0);
            listing.extend_from_slice(leaf.to_hex().as_bytes());
            listing.push(b'\n');
        }

        if !found {
            return Err(ContentHashError::Hash(format!("no such path: {subdir}")));
        }
        Ok(DomainHasher::DIR.hash(&listing))
    }

    fn leaf_digest(&self, path: &str, entry: &Entry, follow_links: bool) -> (&'static str, Digest) {
        match entry {
            Entry::File(bytes) => ("file", DomainHasher::FILE.hash(bytes)),
            Entry::Symlink(target) => {
                if follow_links {
                    if let Some(Entry::File(bytes)) = self.entries.get(&resolve_link(path, target)) {
                        return ("file", DomainHasher::FILE.hash(bytes));
                    }
                }
                ("symlink", DomainHasher::SYMLINK.hash(target.as_bytes()))
            }
        }
    }
}

fn compile_one(pattern: &str) -> ContentHashResult<Pattern> {
    Pattern::new(pattern)
        .map_err(|e| ContentHashError::Hash(format!("invalid pattern {pattern:?}: {e}")))
}

fn compile(patterns: &[String]) -> ContentHashResult<Vec<Pattern>> {
    patterns.iter().map(|p| compile_one(p)).collect()
}

/// `a/b/c` is selected by a pattern matching `a`, `a/b` or `a/b/c`.
fn self_or_ancestor_matches(pattern: &Pattern, path: &str) -> bool {
    path.match_indices('/')
        .any(|(i, _)| pattern.matches_with(&path[..i], MATCH_OPTIONS))
        || pattern.matches_with(path, MATCH_OPTIONS)
}

/// Resolve a symlink target relative to the directory holding the link.
fn resolve_link(link: &str, target: &str) -> String {
    let mut parts: Vec<&str> = if target.starts_with('/') {
        Vec::new()
    } else {
        link.rsplit_once('/')
            .map(|(dir, _)| dir.split('/').collect())
            .unwrap_or_default()
    };
    for component in target.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

/// A [`BuildBackend`] serving registered [`Tree`]s.
///
/// Definitions are evaluated by looking up their `source`; the resulting
/// [`ContentRef`] is identified by the definition digest, so definitions
/// with different attrs yield distinct references to the same tree.
/// Call counters and an optional checksum delay make the backend useful
/// for exercising concurrency.
#[derive(Default)]
pub struct MemoryBackend {
    sources: RwLock<HashMap<String, Tree>>,
    contents: RwLock<HashMap<String, Tree>>,
    metadata: RwLock<HashMap<(String, String), String>>,
    delay: RwLock<Duration>,
    finalize_calls: AtomicUsize,
    checksum_calls: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the tree produced by definitions with this `source`.
    pub fn insert(&self, source: impl Into<String>, tree: Tree) {
        self.sources
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(source.into(), tree);
    }

    /// Make every checksum walk take at least `delay`.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.write().unwrap_or_else(PoisonError::into_inner) = delay;
    }

    pub fn finalize_calls(&self) -> usize {
        self.finalize_calls.load(Ordering::SeqCst)
    }

    pub fn checksum_calls(&self) -> usize {
        self.checksum_calls.load(Ordering::SeqCst)
    }

    fn content(&self, content: &ContentRef) -> Option<Tree> {
        self.contents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(content.id())
            .cloned()
    }
}

#[async_trait]
impl BuildBackend for MemoryBackend {
    async fn evaluate(&self, definition: &Definition) -> ContentHashResult<ContentRef> {
        let tree = self
            .sources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&definition.source)
            .cloned()
            .ok_or_else(|| {
                ContentHashError::Build(format!("nothing builds {:?}", definition.source))
            })?;
        let content = ContentRef::new(definition.digest().to_hex());
        self.contents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(content.id().to_string(), tree);
        Ok(content)
    }

    async fn finalize(&self, content: &ContentRef) -> ContentHashResult<()> {
        self.finalize_calls.fetch_add(1, Ordering::SeqCst);
        match self.content(content) {
            Some(_) => Ok(()),
            None => Err(ContentHashError::Build(format!("unknown content {content}"))),
        }
    }

    async fn checksum(
        &self,
        content: &ContentRef,
        subdir: &str,
        options: &ChecksumOptions,
    ) -> ContentHashResult<Digest> {
        self.checksum_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.read().unwrap_or_else(PoisonError::into_inner);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let tree = self
            .content(content)
            .ok_or_else(|| ContentHashError::Hash(format!("unknown content {content}")))?;
        tree.digest(subdir, options)
    }

    async fn metadata(&self, content: &ContentRef, key: &str) -> ContentHashResult<Option<String>> {
        Ok(self
            .metadata
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(content.id().to_string(), key.to_string()))
            .cloned())
    }

    async fn set_metadata(
        &self,
        content: &ContentRef,
        key: &str,
        value: &str,
    ) -> ContentHashResult<()> {
        self.metadata
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((content.id().to_string(), key.to_string()), value.to_string());
        Ok(())
    }
}
