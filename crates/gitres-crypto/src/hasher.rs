use gitres_types::Digest;

/// BLAKE3 with a domain tag mixed in ahead of the data.
///
/// Content walks hash files, directory listings and symlink targets with
/// different tags, so a file whose bytes happen to equal a listing still
/// digests differently.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DomainHasher {
    domain: &'static str,
}

impl DomainHasher {
    pub const FILE: Self = Self::new("gitres-file-v1");
    pub const DIR: Self = Self::new("gitres-dir-v1");
    pub const SYMLINK: Self = Self::new("gitres-symlink-v1");

    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    pub fn hash(&self, data: &[u8]) -> Digest {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(data);
        Digest::from_hash(*hasher.finalize().as_bytes())
    }

    pub fn domain(&self) -> &'static str {
        self.domain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_kinds_never_collide() {
        let data = b"same bytes";
        let file = DomainHasher::FILE.hash(data);
        assert_ne!(file, DomainHasher::DIR.hash(data));
        assert_ne!(file, DomainHasher::SYMLINK.hash(data));
        assert_eq!(file, DomainHasher::FILE.hash(data));
    }

    #[test]
    fn tag_is_prefixed_with_a_colon() {
        let expected = blake3::hash(b"gitres-file-v1:abc");
        assert_eq!(
            DomainHasher::FILE.hash(b"abc"),
            Digest::from_hash(*expected.as_bytes())
        );
        assert_eq!(DomainHasher::FILE.domain(), "gitres-file-v1");
    }
}
