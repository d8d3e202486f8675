//! The [`Remote`] ref index.
//!
//! A `Remote` is built once per `ls-remote` query and is otherwise treated
//! as an immutable value: filtering produces a new `Remote` that shares the
//! symref table and HEAD override with its parent.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use glob::Pattern;
use tracing::warn;

use gitres_crypto::StringDigest;
use gitres_types::Digest;

use crate::error::{RefError, RefResult};
use crate::names::{is_commit_sha, tail_match_pattern};
use crate::types::{Ref, PEELED_SUFFIX};

/// Prefix of the first field of a symref advertisement line.
const SYMREF_PREFIX: &str = "ref: ";

/// A remote's advertised refs.
///
/// `refs` is kept in ascending byte-wise name order, which is the order git
/// itself advertises refs in; `ref_map` always indexes exactly the entries
/// of `refs`.
#[derive(Clone, Debug, Default)]
pub struct Remote {
    refs: Vec<Ref>,
    ref_map: HashMap<String, Ref>,
    symrefs: Arc<BTreeMap<String, String>>,
    head: Option<Ref>,
}

impl Remote {
    /// An empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `ls-remote --symref` output.
    ///
    /// Each line is `<sha>\t<name>` or `ref: <target>\t<name>`. Lines without
    /// a tab are ignored. The server is trusted to advertise refs in sorted
    /// order; no re-sort happens here.
    pub fn parse(advertisement: &str) -> Self {
        let mut refs = Vec::new();
        let mut ref_map = HashMap::new();
        let mut symrefs = BTreeMap::new();

        for line in advertisement.lines() {
            let Some((key, name)) = line.split_once('\t') else {
                continue;
            };
            if let Some(target) = key.strip_prefix(SYMREF_PREFIX) {
                symrefs.insert(name.to_string(), target.to_string());
            } else {
                let r = Ref::new(name, key);
                ref_map.insert(r.name.clone(), r.clone());
                refs.push(r);
            }
        }

        Self {
            refs,
            ref_map,
            symrefs: Arc::new(symrefs),
            head: None,
        }
    }

    /// Returns a copy whose HEAD resolves to `head` instead of the
    /// advertised HEAD.
    ///
    /// A non-empty `head.name` redirects lookups of `HEAD` to that name; a
    /// non-empty `head.sha` overrides the SHA such lookups return.
    pub fn with_head(&self, head: Ref) -> Self {
        Self {
            head: Some(head),
            ..self.clone()
        }
    }

    /// The advertised refs in sorted order.
    pub fn refs(&self) -> &[Ref] {
        &self.refs
    }

    /// Symref aliases, e.g. `HEAD` → `refs/heads/main`.
    pub fn symrefs(&self) -> &BTreeMap<String, String> {
        &self.symrefs
    }

    pub fn head(&self) -> Option<&Ref> {
        self.head.as_ref()
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    fn with_refs(&self, refs: Vec<Ref>) -> Self {
        let ref_map = refs.iter().map(|r| (r.name.clone(), r.clone())).collect();
        Self {
            refs,
            ref_map,
            symrefs: Arc::clone(&self.symrefs),
            head: self.head.clone(),
        }
    }

    /// Only tags. Peeled `^{}` entries are left out of the listing.
    pub fn tags(&self) -> Self {
        self.with_refs(
            self.refs
                .iter()
                .filter(|r| r.is_tag() && !r.is_peeled())
                .cloned()
                .collect(),
        )
    }

    /// Only branches.
    pub fn branches(&self) -> Self {
        self.with_refs(self.refs.iter().filter(|r| r.is_branch()).cloned().collect())
    }

    /// Refs whose name, or a trailing `/`-delimited suffix of it, matches
    /// any of the glob `patterns`. An empty pattern list selects everything.
    pub fn filter<S: AsRef<str>>(&self, patterns: &[S]) -> Self {
        if patterns.is_empty() {
            return self.clone();
        }
        let compiled: Vec<Pattern> = patterns
            .iter()
            .filter_map(|p| match Pattern::new(p.as_ref()) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    warn!(pattern = p.as_ref(), error = %e, "ignoring malformed ref pattern");
                    None
                }
            })
            .collect();
        self.with_refs(
            self.refs
                .iter()
                .filter(|r| compiled.iter().any(|p| tail_match_pattern(p, &r.name)))
                .cloned()
                .collect(),
        )
    }

    /// Short names of all refs, in order.
    pub fn short_names(&self) -> Vec<String> {
        self.refs.iter().map(|r| r.short_name().to_string()).collect()
    }

    /// Exact lookup by full name.
    pub fn get(&self, name: &str) -> Option<&Ref> {
        self.ref_map.get(name)
    }

    /// Insert a ref, keeping `refs` sorted.
    pub fn add(&mut self, name: impl Into<String>, sha: impl Into<String>) -> RefResult<()> {
        let r = Ref::new(name, sha);
        if self.ref_map.contains_key(&r.name) {
            return Err(RefError::AlreadyExists { name: r.name });
        }
        let at = self.refs.partition_point(|existing| existing.name < r.name);
        self.ref_map.insert(r.name.clone(), r.clone());
        self.refs.insert(at, r);
        Ok(())
    }

    /// Resolve `target` the way `git checkout` would.
    ///
    /// Commit SHAs resolve to themselves without consulting the index.
    /// Otherwise candidates are tried in order: the literal name, `refs/…`,
    /// `refs/heads/…`, `refs/tags/…` and the peeled `refs/tags/…^{}`, so
    /// branches win over tags of the same name. Tags resolve to the commit
    /// their peeled entry points at when one is advertised.
    pub fn lookup(&self, target: &str) -> RefResult<Ref> {
        let is_head = target == "HEAD";
        let mut target = target;
        if is_head {
            if let Some(head) = self.head.as_ref().filter(|h| !h.name.is_empty()) {
                target = &head.name;
            }
        }

        if is_commit_sha(target) {
            return Ok(Ref::commit(target));
        }

        let trimmed = |prefix: &str| target.strip_prefix(prefix).unwrap_or(target).to_string();
        let tag_name = format!("refs/tags/{}", trimmed("refs/tags/"));
        let candidates = [
            target.to_string(),
            format!("refs/{}", trimmed("refs/")),
            format!("refs/heads/{}", trimmed("refs/heads/")),
            tag_name.clone(),
        ];

        let found = candidates
            .iter()
            .find_map(|name| self.ref_map.get(name).cloned())
            .or_else(|| {
                self.ref_map
                    .get(&format!("{tag_name}{PEELED_SUFFIX}"))
                    .map(|peeled| peeled.with_name(tag_name.clone()))
            });
        let Some(mut found) = found else {
            return Err(RefError::NotFound {
                name: target.to_string(),
            });
        };

        if found.is_tag() && !found.is_peeled() {
            if let Some(peeled) = self.ref_map.get(&format!("{}{PEELED_SUFFIX}", found.name)) {
                found = found.with_sha(peeled.sha.clone());
            }
        }

        if !found.has_commit() {
            return Err(RefError::InvalidRef {
                name: found.name,
                sha: found.sha,
            });
        }

        if let Some(alias_target) = self.symrefs.get(&found.name) {
            found = found.with_name(alias_target.clone());
        }

        if is_head {
            if let Some(head) = self.head.as_ref().filter(|h| !h.sha.is_empty()) {
                found = found.with_sha(head.sha.clone());
            }
        }

        Ok(found)
    }

    /// Digest over all refs and the HEAD override.
    pub fn digest(&self) -> Digest {
        let mut builder = StringDigest::new();
        for r in &self.refs {
            builder.push("ref").push(r.digest().to_string());
        }
        if let Some(head) = &self.head {
            builder.push("head").push(head.digest().to_string());
        }
        builder.finish()
    }
}
