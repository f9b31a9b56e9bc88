//! Content hashing for Arbor.
//!
//! Object ids are BLAKE3 hashes prefixed with a per-kind domain tag, so a
//! blob and a tree with identical bytes never collide.

pub mod hasher;

pub use hasher::ContentHasher;
