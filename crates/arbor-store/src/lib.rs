//! Content-addressed object storage for Arbor.
//!
//! A hash-keyed object store analogous to git's `.git/objects/` directory.
//! Blobs and trees are immutable once written and are identified by their
//! BLAKE3 hash, domain-separated by object kind.
//!
//! # Object Types
//!
//! - [`Blob`] -- raw file content
//! - [`Tree`] -- directory listing mapping names to object references
//!
//! # Storage Backends
//!
//! All backends implement the [`ObjectStore`] trait:
//!
//! - [`InMemoryObjectStore`] -- `HashMap`-based store for tests and embedding
//!
//! Trees are assembled through a [`TreeBuilder`] session borrowed from a
//! store for the duration of a single write.

pub mod builder;
pub mod error;
pub mod memory;
pub mod object;
pub mod traits;

pub use builder::TreeBuilder;
pub use error::{StoreError, StoreResult};
pub use memory::InMemoryObjectStore;
pub use object::{Blob, EntryMode, ObjectKind, StoredObject, Tree, TreeEntry};
pub use traits::ObjectStore;
