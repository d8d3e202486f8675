//! Ref name utilities.
//!
//! Valid ref names follow `git check-ref-format`:
//! - Must be non-empty
//! - Must not contain whitespace, `~`, `^`, `:`, `?`, `*`, `[`, `\`
//! - Must not contain `..` (double dot) or `@{`
//! - Must not start or end with `.` or `/`
//! - Must not end with `.lock`
//! - Must not contain consecutive slashes (`//`)
//! - Components between slashes must be non-empty and not start with `.`

use glob::{MatchOptions, Pattern};

use crate::error::{RefError, RefResult};

/// Characters that are forbidden anywhere in a ref name.
const FORBIDDEN_CHARS: &[char] = &[' ', '\t', '\n', '\r', '~', '^', ':', '?', '*', '[', '\\'];

/// Prefixes stripped by [`short_name`], most specific first.
const SHORT_NAME_PREFIXES: &[&str] = &["refs/heads/", "refs/tags/", "refs/remotes/", "refs/"];

/// Returns `true` if `s` is a full SHA-1 (40) or SHA-256 (64) commit id in
/// lowercase hex.
///
/// # Examples
///
/// ```
/// use gitres_refs::names::is_commit_sha;
///
/// assert!(is_commit_sha("b6315d8f2810962c601af73f86831f6866ea798b"));
/// assert!(!is_commit_sha("b6315d8"));
/// assert!(!is_commit_sha("main"));
/// ```
pub fn is_commit_sha(s: &str) -> bool {
    (s.len() == 40 || s.len() == 64) && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Strips the conventional `refs/...` prefix from a ref name.
///
/// A name that is itself a commit SHA is returned unchanged.
pub fn short_name(name: &str) -> &str {
    if is_commit_sha(name) {
        return name;
    }
    SHORT_NAME_PREFIXES
        .iter()
        .find_map(|prefix| name.strip_prefix(prefix))
        .unwrap_or(name)
}

/// Validate a ref name, returning `Ok(())` if valid.
pub fn validate_ref_name(name: &str) -> RefResult<()> {
    let invalid = |reason: String| RefError::InvalidRefName {
        name: name.to_string(),
        reason,
    };

    if name.is_empty() {
        return Err(invalid("ref name must not be empty".into()));
    }

    for ch in FORBIDDEN_CHARS {
        if name.contains(*ch) {
            return Err(invalid(format!("contains forbidden character: {ch:?}")));
        }
    }

    if name.contains("..") {
        return Err(invalid("must not contain '..'".into()));
    }

    if name.contains("@{") {
        return Err(invalid("must not contain '@{'".into()));
    }

    if name.starts_with('.') || name.ends_with('.') {
        return Err(invalid("must not start or end with '.'".into()));
    }

    if name.starts_with('/') || name.ends_with('/') {
        return Err(invalid("must not start or end with '/'".into()));
    }

    if name.ends_with(".lock") {
        return Err(invalid("must not end with '.lock'".into()));
    }

    if name.contains("//") {
        return Err(invalid("must not contain consecutive slashes '//'".into()));
    }

    if let Some(component) = name.split('/').find(|c| c.starts_with('.')) {
        return Err(invalid(format!("component must not start with '.': {component:?}")));
    }

    Ok(())
}

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Matches a compiled glob against `name` or any trailing `/`-delimited
/// suffix of it.
///
/// `*` and `?` never cross `/`; `**` as a whole component spans any number
/// of components.
pub(crate) fn tail_match_pattern(pattern: &Pattern, name: &str) -> bool {
    if pattern.matches_with(name, MATCH_OPTIONS) {
        return true;
    }
    name.match_indices('/')
        .any(|(i, _)| pattern.matches_with(&name[i + 1..], MATCH_OPTIONS))
}

/// Tail-anchored glob match of `pattern` against the ref `name`.
///
/// `"v*"` selects `refs/tags/v1.0.0` by its leaf, `"refs/tags/v*"` selects
/// it by its full path. Malformed patterns match nothing.
pub fn tail_match(pattern: &str, name: &str) -> bool {
    match Pattern::new(pattern) {
        Ok(pattern) => tail_match_pattern(&pattern, name),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_sha_lengths() {
        assert!(is_commit_sha(&"a".repeat(40)));
        assert!(is_commit_sha(&"0".repeat(64)));
        assert!(!is_commit_sha(&"a".repeat(39)));
        assert!(!is_commit_sha(&"a".repeat(41)));
        assert!(!is_commit_sha(""));
    }

    #[test]
    fn commit_sha_rejects_non_hex_and_uppercase() {
        assert!(!is_commit_sha(&"g".repeat(40)));
        assert!(!is_commit_sha(&"A".repeat(40)));
    }

    #[test]
    fn short_names() {
        assert_eq!(short_name("refs/heads/main"), "main");
        assert_eq!(short_name("refs/heads/feature/x"), "feature/x");
        assert_eq!(short_name("refs/tags/v1.0.0"), "v1.0.0");
        assert_eq!(short_name("refs/remotes/origin/main"), "origin/main");
        assert_eq!(short_name("refs/pull/1/head"), "pull/1/head");
        assert_eq!(short_name("HEAD"), "HEAD");
        let sha = "b6315d8f2810962c601af73f86831f6866ea798b";
        assert_eq!(short_name(sha), sha);
    }

    #[test]
    fn valid_ref_names() {
        assert!(validate_ref_name("refs/heads/main").is_ok());
        assert!(validate_ref_name("refs/tags/v1.0").is_ok());
        assert!(validate_ref_name("refs/heads/user/alice/fix-123").is_ok());
    }

    #[test]
    fn reject_bad_ref_names() {
        for bad in [
            "",
            "bad..name",
            "has space",
            "a~b",
            "a^b",
            "a:b",
            "a?b",
            "a*b",
            "a[b",
            "a\\b",
            ".hidden",
            "trailing.",
            "/leading",
            "trailing/",
            "a//b",
            "main.lock",
            "ref@{0}",
            "refs/heads/.hidden",
        ] {
            assert!(validate_ref_name(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn tail_match_by_leaf() {
        assert!(tail_match("v*", "refs/tags/v1.0.0"));
        assert!(!tail_match("v*", "refs/heads/main"));
    }

    #[test]
    fn tail_match_by_full_path() {
        assert!(tail_match("refs/tags/v*", "refs/tags/v1.0.0"));
        assert!(!tail_match("refs/heads/v*", "refs/tags/v1.0.0"));
    }

    #[test]
    fn tail_match_by_partial_path() {
        assert!(tail_match("tags/v*", "refs/tags/v1.0.0"));
        assert!(tail_match("feature/*", "refs/heads/feature/login"));
    }

    #[test]
    fn single_star_does_not_cross_separator() {
        assert!(!tail_match("feature/*", "refs/heads/feature/a/b"));
        assert!(!tail_match("refs/*", "refs/heads/main"));
    }

    #[test]
    fn double_star_crosses_separators() {
        assert!(tail_match("refs/**/v*", "refs/tags/v1"));
        assert!(tail_match("refs/**/v*", "refs/tags/release/v2"));
        assert!(!tail_match("refs/**/v*", "refs/heads/main"));
    }

    #[test]
    fn question_mark_matches_one_char() {
        assert!(tail_match("v1.?.0", "refs/tags/v1.2.0"));
        assert!(!tail_match("v1.?.0", "refs/tags/v1.12.0"));
    }

    #[test]
    fn malformed_pattern_matches_nothing() {
        assert!(!tail_match("a**b", "refs/heads/a**b"));
    }
}
