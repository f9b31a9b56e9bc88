//! Foundation types for Arbor.
//!
//! Every other Arbor crate depends on `arbor-types` for the identifier that
//! names stored objects.
//!
//! # Key Types
//!
//! - [`ObjectId`] -- Content-addressed identifier (BLAKE3 hash)
//! - [`TypeError`] -- Parse failures for identifiers

pub mod error;
pub mod object;

pub use error::TypeError;
pub use object::ObjectId;
