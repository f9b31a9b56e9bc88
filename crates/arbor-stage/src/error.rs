//! Error types for the staging crate.

use std::path::PathBuf;

use arbor_types::ObjectId;

use crate::entry::EntryKind;

/// Errors that can occur while editing or building a staged tree.
#[derive(Debug, thiserror::Error)]
pub enum StagingError {
    /// Empty path, empty segment, or trailing slash. Raised before any
    /// mutation.
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    /// A missing required value, or a mode that does not fit the entry kind.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Two differing non-tree entries collided under `MergePolicy::Throw`.
    #[error("merge conflict at {path}")]
    MergeConflict { path: String },

    /// A merge tried to combine a tree with a non-tree under one name.
    #[error("cannot merge {incoming} into existing {existing} at {path}")]
    KindMismatch {
        path: String,
        existing: EntryKind,
        incoming: EntryKind,
    },

    /// A tree id did not resolve to anything in the store.
    #[error("tree not found: {0}")]
    ObjectNotFound(ObjectId),

    /// A file-backed blob could not be read at build time.
    #[error("failed to read blob source {}: {source}", path.display())]
    BlobSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A freshly written tree could not be resolved back from the store.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] arbor_store::StoreError),
}

/// Convenience alias for staging results.
pub type StagingResult<T> = Result<T, StagingError>;
