//! Hashing primitives for gitres.
//!
//! Provides domain-separated BLAKE3 hashing for content walks and the
//! NUL-delimited string-tuple digest that every canonical cache identity is
//! built from.
//!
//! All operations wrap the `blake3` crate.

pub mod hasher;
pub mod strings;

pub use hasher::DomainHasher;
pub use strings::{hash_strings, StringDigest};
