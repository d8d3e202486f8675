//! Content digests over build outputs.
//!
//! A [`ContentHasher`] turns a build [`Definition`] plus a subdirectory into
//! a reproducible [`Digest`](gitres_types::Digest) of the files found
//! there. Digests never depend on how the content was fetched, so two
//! fetches of the same commit with different credentials agree.
//!
//! # Design Rules
//!
//! 1. At most one checksum walk is in flight per
//!    `(content, subdir, options)` key. Concurrent callers share its outcome.
//! 2. Only the unfiltered whole-tree digest is persisted on the content
//!    reference. Filtered digests describe a query, not the content.
//! 3. The build backend is consumed through the [`BuildBackend`] trait.
//!
//! # Modules
//!
//! - [`error`]: [`ContentHashError`]
//! - [`traits`]: [`BuildBackend`], [`Definition`], [`ContentRef`]
//! - [`options`]: [`ChecksumOptions`]
//! - [`hasher`]: [`ContentHasher`]
//! - [`memory`]: [`MemoryBackend`], an in-memory backend for tests and embedding

pub mod error;
pub mod hasher;
pub mod memory;
pub mod options;
pub mod traits;

pub use error::{ContentHashError, ContentHashResult};
pub use hasher::{ContentHasher, CONTENT_DIGEST_KEY};
pub use memory::{Entry, MemoryBackend, Tree};
pub use options::ChecksumOptions;
pub use traits::{BuildBackend, ContentRef, Definition};
