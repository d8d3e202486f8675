//! String-tuple digests.
//!
//! Every canonical identity in gitres is the digest of an ordered tuple of
//! strings. Each part is fed to BLAKE3 followed by a single NUL byte, so
//! `["ab", "c"]` and `["a", "bc"]` never collide. This encoding is part of
//! the cache format: changing it invalidates every stored identity.

use gitres_types::Digest;

/// Digest of an ordered tuple of strings.
pub fn hash_strings<I, S>(parts: I) -> Digest
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut builder = StringDigest::new();
    for part in parts {
        builder.push(part);
    }
    builder.finish()
}

/// Incremental form of [`hash_strings`].
#[derive(Clone, Default)]
pub struct StringDigest {
    hasher: blake3::Hasher,
}

impl StringDigest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one part of the tuple.
    pub fn push(&mut self, part: impl AsRef<str>) -> &mut Self {
        self.hasher.update(part.as_ref().as_bytes());
        self.hasher.update(&[0]);
        self
    }

    pub fn finish(&self) -> Digest {
        Digest::from_hash(*self.hasher.finalize().as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_boundaries_matter() {
        assert_ne!(hash_strings(["ab", "c"]), hash_strings(["a", "bc"]));
    }

    #[test]
    fn order_matters() {
        assert_ne!(hash_strings(["a", "b"]), hash_strings(["b", "a"]));
    }

    #[test]
    fn empty_part_is_not_ignored() {
        assert_ne!(hash_strings(["a"]), hash_strings(["a", ""]));
    }

    #[test]
    fn builder_matches_function() {
        let mut builder = StringDigest::new();
        builder.push("gitref/v1").push("name:refs/heads/main");
        assert_eq!(
            builder.finish(),
            hash_strings(["gitref/v1", "name:refs/heads/main"])
        );
    }

    #[test]
    fn encoding_is_nul_terminated_parts() {
        let expected = Digest::from_bytes(b"x\0y\0");
        assert_eq!(hash_strings(["x", "y"]), expected);
    }
}
