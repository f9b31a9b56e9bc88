//! Entry descriptors: what a single name in a staged tree points at.

use std::fmt;
use std::path::PathBuf;

use arbor_store::{Blob, EntryMode, TreeEntry};
use arbor_types::ObjectId;

use crate::error::{StagingError, StagingResult};
use crate::tree::StagedTree;

/// The kind of a tree entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// File content.
    Blob,
    /// Subdirectory.
    Tree,
    /// Commit in another repository (gitlink / submodule).
    Link,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blob => write!(f, "blob"),
            Self::Tree => write!(f, "tree"),
            Self::Link => write!(f, "link"),
        }
    }
}

/// Blob content that is only read when the tree is built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlobSource {
    /// Bytes already in memory.
    Bytes(Vec<u8>),
    /// A file opened through a [`ContentResolver`](crate::ContentResolver).
    File(PathBuf),
}

/// Where an entry's content lives.
#[derive(Clone, Debug)]
pub enum EntryTarget {
    /// An object already in the store (or, for links, a foreign commit).
    Persisted(ObjectId),
    /// A subtree open for editing; written when the parent is built.
    Pending(Box<StagedTree>),
    /// Blob content waiting to be written.
    Deferred(BlobSource),
}

/// Kind, mode and target of one named slot in a [`StagedTree`].
///
/// Fields are private so that every descriptor respects the kind/mode
/// pairing: blobs take `Regular`, `Executable` or `Symlink`; trees take
/// `Directory`; links take `Gitlink`. Only trees can be `Pending` and only
/// blobs can be `Deferred`.
#[derive(Clone, Debug)]
pub struct EntryDescriptor {
    kind: EntryKind,
    mode: EntryMode,
    target: EntryTarget,
}

impl EntryDescriptor {
    /// A blob already in the store.
    pub fn blob(id: ObjectId, mode: EntryMode) -> StagingResult<Self> {
        require_id(&id, "blob")?;
        require_blob_mode(mode)?;
        Ok(Self {
            kind: EntryKind::Blob,
            mode,
            target: EntryTarget::Persisted(id),
        })
    }

    /// A tree already in the store.
    pub fn tree(id: ObjectId) -> StagingResult<Self> {
        require_id(&id, "tree")?;
        Ok(Self {
            kind: EntryKind::Tree,
            mode: EntryMode::Directory,
            target: EntryTarget::Persisted(id),
        })
    }

    /// A link to `commit` in another repository.
    pub fn link(commit: ObjectId) -> StagingResult<Self> {
        require_id(&commit, "link")?;
        Ok(Self {
            kind: EntryKind::Link,
            mode: EntryMode::Gitlink,
            target: EntryTarget::Persisted(commit),
        })
    }

    /// A blob whose bytes are written at build time.
    pub fn bytes(data: impl Into<Vec<u8>>, mode: EntryMode) -> StagingResult<Self> {
        require_blob_mode(mode)?;
        Ok(Self {
            kind: EntryKind::Blob,
            mode,
            target: EntryTarget::Deferred(BlobSource::Bytes(data.into())),
        })
    }

    /// A blob read from `path` at build time, not before.
    pub fn file(path: impl Into<PathBuf>, mode: EntryMode) -> StagingResult<Self> {
        require_blob_mode(mode)?;
        let path = path.into();
        if path.as_os_str().is_empty() {
            return Err(StagingError::InvalidArgument(
                "blob source path must not be empty".into(),
            ));
        }
        Ok(Self {
            kind: EntryKind::Blob,
            mode,
            target: EntryTarget::Deferred(BlobSource::File(path)),
        })
    }

    /// A bare object id interpreted through its mode: `Gitlink` gives a
    /// link, blob modes give a blob. Trees need [`EntryDescriptor::tree`].
    pub fn object(id: ObjectId, mode: EntryMode) -> StagingResult<Self> {
        match mode {
            EntryMode::Gitlink => Self::link(id),
            EntryMode::Directory => Err(StagingError::InvalidArgument(
                "a tree cannot be added from a bare id and mode; use a tree descriptor".into(),
            )),
            _ => Self::blob(id, mode),
        }
    }

    /// A subtree that is already open for editing.
    pub fn staged(tree: StagedTree) -> Self {
        Self {
            kind: EntryKind::Tree,
            mode: EntryMode::Directory,
            target: EntryTarget::Pending(Box::new(tree)),
        }
    }

    /// Mirror an entry of a persisted tree.
    pub fn from_tree_entry(entry: &TreeEntry) -> Self {
        let kind = match entry.mode {
            EntryMode::Directory => EntryKind::Tree,
            EntryMode::Gitlink => EntryKind::Link,
            _ => EntryKind::Blob,
        };
        Self {
            kind,
            mode: entry.mode,
            target: EntryTarget::Persisted(entry.object_id),
        }
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    pub fn mode(&self) -> EntryMode {
        self.mode
    }

    pub fn target(&self) -> &EntryTarget {
        &self.target
    }

    pub fn is_tree(&self) -> bool {
        self.kind == EntryKind::Tree
    }

    /// The stored id, if the entry has been persisted.
    pub fn persisted_id(&self) -> Option<ObjectId> {
        match self.target {
            EntryTarget::Persisted(id) => Some(id),
            _ => None,
        }
    }

    /// The id this entry has or will have, when it is known without I/O.
    ///
    /// In-memory bytes are hashed; pending trees and file sources have no
    /// id until they are built.
    pub fn resolved_id(&self) -> Option<ObjectId> {
        match &self.target {
            EntryTarget::Persisted(id) => Some(*id),
            EntryTarget::Deferred(BlobSource::Bytes(data)) => Some(Blob::id_for(data)),
            EntryTarget::Deferred(BlobSource::File(_)) | EntryTarget::Pending(_) => None,
        }
    }

    /// Whether two descriptors name the same content with the same mode.
    ///
    /// File sources that are not yet read compare by path.
    pub fn same_content(&self, other: &Self) -> bool {
        if self.kind != other.kind || self.mode != other.mode {
            return false;
        }
        match (self.resolved_id(), other.resolved_id()) {
            (Some(a), Some(b)) => a == b,
            (None, None) => match (&self.target, &other.target) {
                (
                    EntryTarget::Deferred(BlobSource::File(a)),
                    EntryTarget::Deferred(BlobSource::File(b)),
                ) => a == b,
                _ => false,
            },
            _ => false,
        }
    }

    /// The persisted tree entry for `name`, once this descriptor is persisted.
    pub fn to_tree_entry(&self, name: &str) -> Option<TreeEntry> {
        self.persisted_id()
            .map(|id| TreeEntry::new(self.mode, name, id))
    }

    pub(crate) fn pending_tree(&self) -> Option<&StagedTree> {
        match &self.target {
            EntryTarget::Pending(tree) => Some(&**tree),
            _ => None,
        }
    }

    pub(crate) fn pending_tree_mut(&mut self) -> Option<&mut StagedTree> {
        match &mut self.target {
            EntryTarget::Pending(tree) => Some(&mut **tree),
            _ => None,
        }
    }

    pub(crate) fn into_target(self) -> EntryTarget {
        self.target
    }

    /// Replace a pending or deferred target with the id it was written as.
    pub(crate) fn settle(&mut self, id: ObjectId) {
        self.target = EntryTarget::Persisted(id);
    }
}

fn require_id(id: &ObjectId, what: &str) -> StagingResult<()> {
    if id.is_null() {
        return Err(StagingError::InvalidArgument(format!(
            "{what} entry requires a non-null object id"
        )));
    }
    Ok(())
}

fn require_blob_mode(mode: EntryMode) -> StagingResult<()> {
    if !mode.is_blob() {
        return Err(StagingError::InvalidArgument(format!(
            "mode {mode} is not valid for a blob entry"
        )));
    }
    Ok(())
}
