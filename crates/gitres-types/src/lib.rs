//! Foundation types for gitres.
//!
//! This crate provides the identity and addressing types shared by every
//! other gitres crate.
//!
//! # Key Types
//!
//! - [`Digest`]: Content-addressed identifier (BLAKE3 hash), used for both
//!   canonical cache identities and content digests
//! - [`GitUrl`]: A parsed git remote URL with an explicit protocol
//! - [`Protocol`]: The transport protocol named by a [`GitUrl`]

pub mod digest;
pub mod error;
pub mod url;

pub use digest::Digest;
pub use error::TypeError;
pub use url::{GitUrl, Protocol};
