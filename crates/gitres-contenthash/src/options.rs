//! Checksum walk options.

use serde::{Deserialize, Serialize};

use gitres_crypto::StringDigest;
use gitres_types::Digest;

/// Options controlling a checksum walk.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChecksumOptions {
    /// Hash the target of symlinks instead of the link text.
    pub follow_links: bool,
    /// Treat the subdirectory as a glob pattern.
    pub wildcard: bool,
    /// When non-empty, only paths matching one of these globs are hashed.
    pub include: Vec<String>,
    /// Paths matching any of these globs are skipped.
    pub exclude: Vec<String>,
}

impl ChecksumOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_follow_links(mut self, follow: bool) -> Self {
        self.follow_links = follow;
        self
    }

    pub fn with_wildcard(mut self, wildcard: bool) -> Self {
        self.wildcard = wildcard;
        self
    }

    pub fn with_include<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include.extend(patterns.into_iter().map(Into::into));
        self
    }

    pub fn with_exclude<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude.extend(patterns.into_iter().map(Into::into));
        self
    }

    /// No include or exclude patterns are set.
    pub fn is_unfiltered(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    /// Digest identifying these options in deduplication keys.
    pub fn key(&self) -> Digest {
        let mut builder = StringDigest::new();
        builder
            .push(format!("followlinks={}", self.follow_links))
            .push(format!("wildcard={}", self.wildcard))
            .push("include=");
        for pattern in &self.include {
            builder.push(pattern);
        }
        builder.push("exclude=");
        for pattern in &self.exclude {
            builder.push(pattern);
        }
        builder.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_distinguishes_include_from_exclude() {
        let include = ChecksumOptions::new().with_include([".git"]);
        let exclude = ChecksumOptions::new().with_exclude([".git"]);
        assert_ne!(include.key(), exclude.key());
    }

    #[test]
    fn key_covers_flags() {
        let base = ChecksumOptions::new();
        assert_ne!(base.key(), base.clone().with_follow_links(true).key());
        assert_ne!(base.key(), base.clone().with_wildcard(true).key());
        assert_eq!(base.key(), ChecksumOptions::default().key());
    }

    #[test]
    fn unfiltered_ignores_flags() {
        assert!(ChecksumOptions::new().with_follow_links(true).is_unfiltered());
        assert!(!ChecksumOptions::new().with_exclude(["a"]).is_unfiltered());
    }
}
