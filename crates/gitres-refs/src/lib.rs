//! Remote ref index for gitres.
//!
//! This crate turns a remote's ref advertisement (the output of
//! `git ls-remote --symref`) into a [`Remote`] and answers "what does this
//! name resolve to" the way `git checkout` would: bare names may be
//! branches, tags or commit SHAs, annotated tags are dereferenced through
//! their peeled entries, and symrefs such as `HEAD` resolve to the branch
//! they alias.
//!
//! # Modules
//!
//! - [`error`]: Error types for ref operations
//! - [`types`]: The [`Ref`] value type
//! - [`remote`]: The [`Remote`] index: parsing, filtering, lookup
//! - [`names`]: Commit SHA detection, ref name validation, glob matching

pub mod error;
pub mod names;
pub mod remote;
pub mod types;

pub use error::{RefError, RefResult};
pub use names::{is_commit_sha, short_name, tail_match, validate_ref_name};
pub use remote::Remote;
pub use types::Ref;
