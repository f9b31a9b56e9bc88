//! Mutable staging trees for Arbor.
//!
//! A [`StagedTree`] is an editable directory hierarchy layered over trees
//! already persisted in an [`ObjectStore`](arbor_store::ObjectStore). Entries
//! are addressed with slash-separated paths; persisted subtrees are opened
//! for editing the first time a path descends through them, and the whole
//! hierarchy is written back bottom-up by [`StagedTree::build`].
//!
//! # Key Types
//!
//! - [`StagedTree`] -- the editable hierarchy
//! - [`EntryDescriptor`] -- kind, mode and target of one named slot
//! - [`EntryTarget`] -- persisted id, pending subtree, or deferred blob
//! - [`MergePolicy`] -- Keep / Overwrite / Throw on colliding entries
//! - [`ContentResolver`] -- reads file-backed blobs at build time
//! - [`StageConfig`] -- TOML configuration for callers such as the CLI

pub mod build;
pub mod config;
pub mod entry;
pub mod error;
pub mod merge;
mod path;
pub mod resolver;
pub mod submodule;
pub mod tree;

pub use build::BuiltTree;
pub use config::{ConfigError, StageConfig};
pub use entry::{BlobSource, EntryDescriptor, EntryKind, EntryTarget};
pub use error::{StagingError, StagingResult};
pub use merge::MergePolicy;
pub use resolver::{ContentResolver, FsResolver};
pub use submodule::{Submodule, SubmoduleRef};
pub use tree::StagedTree;
