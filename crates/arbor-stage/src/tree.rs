//! The editable tree: path lookup, add, remove, and on-demand opening of
//! persisted subtrees.
//!
//! A [`StagedTree`] holds one level of a directory hierarchy as a
//! `BTreeMap<String, EntryDescriptor>`. A subtree is "open" exactly when its
//! descriptor target is [`EntryTarget::Pending`]; the parent owns it, so at
//! most one editable instance exists per name and every multi-segment edit
//! through that name reaches it.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use arbor_store::{EntryMode, ObjectStore, StoreError, Tree, TreeEntry};
use arbor_types::ObjectId;
use tracing::debug;

use crate::entry::{EntryDescriptor, EntryKind, EntryTarget};
use crate::error::{StagingError, StagingResult};
use crate::merge::MergePolicy;
use crate::path;
use crate::submodule::Submodule;

/// A mutable staging tree over an object store.
#[derive(Clone)]
pub struct StagedTree {
    pub(crate) store: Arc<dyn ObjectStore>,
    pub(crate) entries: BTreeMap<String, EntryDescriptor>,
}

impl std::fmt::Debug for StagedTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagedTree")
            .field("entries", &self.entries)
            .finish_non_exhaustive()
    }
}

impl StagedTree {
    /// Create an empty tree backed by the given store.
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            entries: BTreeMap::new(),
        }
    }

    /// Copy the immediate entries of a persisted tree. Subtrees stay
    /// persisted until a path descends into them.
    pub fn from_tree(store: Arc<dyn ObjectStore>, tree: &Tree) -> Self {
        let entries = tree
            .entries
            .iter()
            .map(|e| (e.name.clone(), EntryDescriptor::from_tree_entry(e)))
            .collect();
        Self { store, entries }
    }

    /// Look up the tree `id` in `store` and copy its immediate entries.
    pub fn open(store: Arc<dyn ObjectStore>, id: &ObjectId) -> StagingResult<Self> {
        let tree = store
            .read_tree(id)?
            .ok_or(StagingError::ObjectNotFound(*id))?;
        Ok(Self::from_tree(store, &tree))
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Number of direct children.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names of the direct children, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Direct children with their descriptors, sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &EntryDescriptor)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Names of the direct children currently open for editing.
    pub fn unwrapped_names(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, e)| e.pending_tree().is_some())
            .map(|(k, _)| k.as_str())
            .collect()
    }

    // ---------------------------------------------------------------
    // Lookup
    // ---------------------------------------------------------------

    /// The descriptor at `path`, or `None` if any segment is missing or an
    /// intermediate segment is not a tree.
    ///
    /// Never opens subtrees: persisted intermediates are read into a
    /// throwaway copy.
    pub fn get(&self, path: &str) -> StagingResult<Option<EntryDescriptor>> {
        let segments = path::split(path)?;
        self.lookup(&segments, EntryDescriptor::clone)
    }

    /// Whether anything exists at `path`.
    pub fn contains(&self, path: &str) -> StagingResult<bool> {
        let segments = path::split(path)?;
        Ok(self.lookup(&segments, |_| ())?.is_some())
    }

    fn lookup<R>(
        &self,
        segments: &[&str],
        f: impl FnOnce(&EntryDescriptor) -> R,
    ) -> StagingResult<Option<R>> {
        let Some((first, rest)) = segments.split_first() else {
            return Ok(None);
        };
        let Some(entry) = self.entries.get(*first) else {
            return Ok(None);
        };
        if rest.is_empty() {
            return Ok(Some(f(entry)));
        }
        match entry.target() {
            EntryTarget::Pending(child) => child.lookup(rest, f),
            EntryTarget::Persisted(id) if entry.kind() == EntryKind::Tree => {
                match self.store.read_tree(id) {
                    Ok(Some(tree)) => {
                        Self::from_tree(Arc::clone(&self.store), &tree).lookup(rest, f)
                    }
                    // A dangling or mistyped tree id cannot be followed.
                    Ok(None) | Err(StoreError::CorruptObject { .. }) => {
                        debug!(name = *first, tree = %id.short_hex(), "tree not readable");
                        Ok(None)
                    }
                    Err(e) => Err(e.into()),
                }
            }
            _ => Ok(None),
        }
    }

    // ---------------------------------------------------------------
    // Opening subtrees
    // ---------------------------------------------------------------

    /// The editable child tree called `name`.
    ///
    /// An open child is returned as is. A persisted tree is copied one level
    /// deep and installed as pending. A blob, link or missing slot yields
    /// `None` unless `create_if_absent` is set, in which case a fresh empty
    /// tree replaces whatever was there.
    pub(crate) fn child_tree_mut(
        &mut self,
        name: &str,
        create_if_absent: bool,
    ) -> StagingResult<Option<&mut StagedTree>> {
        let replacement = match self.entries.get(name) {
            Some(entry) => match entry.target() {
                EntryTarget::Pending(_) => None,
                EntryTarget::Persisted(id) if entry.kind() == EntryKind::Tree => {
                    debug!(name, tree = %id.short_hex(), "opening persisted subtree");
                    Some(Self::open(Arc::clone(&self.store), id)?)
                }
                _ if create_if_absent => {
                    debug!(name, kind = %entry.kind(), "replacing entry with a directory");
                    Some(Self::new(Arc::clone(&self.store)))
                }
                _ => return Ok(None),
            },
            None if create_if_absent => Some(Self::new(Arc::clone(&self.store))),
            None => return Ok(None),
        };
        if let Some(tree) = replacement {
            self.entries
                .insert(name.to_string(), EntryDescriptor::staged(tree));
        }
        Ok(self
            .entries
            .get_mut(name)
            .and_then(EntryDescriptor::pending_tree_mut))
    }

    /// Like `child_tree_mut(name, true)`, for callers that need a directory.
    pub(crate) fn child_tree_or_create(&mut self, name: &str) -> StagingResult<&mut StagedTree> {
        self.child_tree_mut(name, true)?.ok_or_else(|| {
            StagingError::InvalidArgument(format!("{name:?} could not be opened as a tree"))
        })
    }

    // ---------------------------------------------------------------
    // Add
    // ---------------------------------------------------------------

    /// Set the entry at `path`, creating intermediate directories.
    ///
    /// The last write wins. An intermediate blob or link is replaced by a
    /// directory. An empty `path` with a tree descriptor merges that tree's
    /// children into this one under [`MergePolicy::Throw`].
    pub fn add(&mut self, path: &str, descriptor: EntryDescriptor) -> StagingResult<()> {
        if path.is_empty() && descriptor.is_tree() {
            return self.merge_contents("", descriptor, MergePolicy::Throw);
        }
        let segments = path::split(path)?;
        self.add_at(&segments, descriptor)
    }

    fn add_at(&mut self, segments: &[&str], descriptor: EntryDescriptor) -> StagingResult<()> {
        match segments {
            [name] => {
                self.entries.insert(name.to_string(), descriptor);
                Ok(())
            }
            [first, rest @ ..] => self.child_tree_or_create(first)?.add_at(rest, descriptor),
            [] => Ok(()),
        }
    }

    /// Add a blob that is already in the store.
    pub fn add_blob(&mut self, path: &str, id: ObjectId, mode: EntryMode) -> StagingResult<()> {
        self.add(path, EntryDescriptor::blob(id, mode)?)
    }

    /// Add a tree that is already in the store.
    pub fn add_tree(&mut self, path: &str, id: ObjectId) -> StagingResult<()> {
        self.add(path, EntryDescriptor::tree(id)?)
    }

    /// Add in-memory bytes, written as a blob at build time.
    pub fn add_bytes(
        &mut self,
        path: &str,
        data: impl Into<Vec<u8>>,
        mode: EntryMode,
    ) -> StagingResult<()> {
        self.add(path, EntryDescriptor::bytes(data, mode)?)
    }

    /// Add a file whose content is read only at build time.
    pub fn add_file(
        &mut self,
        path: &str,
        source: impl Into<PathBuf>,
        mode: EntryMode,
    ) -> StagingResult<()> {
        self.add(path, EntryDescriptor::file(source, mode)?)
    }

    /// Add a bare id whose kind follows from `mode` (blob or gitlink).
    pub fn add_object(&mut self, path: &str, id: ObjectId, mode: EntryMode) -> StagingResult<()> {
        self.add(path, EntryDescriptor::object(id, mode)?)
    }

    /// Add a link to `commit` in another repository.
    pub fn add_link(&mut self, path: &str, commit: ObjectId) -> StagingResult<()> {
        self.add(path, EntryDescriptor::link(commit)?)
    }

    /// Add a link to the submodule's head commit at the submodule's path.
    pub fn add_submodule(&mut self, submodule: &dyn Submodule) -> StagingResult<()> {
        let head = submodule.head_commit().ok_or_else(|| {
            StagingError::InvalidArgument(format!(
                "submodule {:?} has no head commit",
                submodule.path()
            ))
        })?;
        self.add_link(submodule.path(), head)
    }

    /// Add a copy of an entry from a persisted tree.
    pub fn add_entry(&mut self, path: &str, entry: &TreeEntry) -> StagingResult<()> {
        self.add(path, EntryDescriptor::from_tree_entry(entry))
    }

    // ---------------------------------------------------------------
    // Remove
    // ---------------------------------------------------------------

    /// Remove the entry at `path`. Returns `false`, touching nothing, if
    /// there is no such entry.
    ///
    /// Every directory the removal leaves empty is removed from its parent,
    /// all the way up to (but not including) this tree.
    pub fn remove(&mut self, path: &str) -> StagingResult<bool> {
        let segments = path::split(path)?;
        if self.lookup(&segments, |_| ())?.is_none() {
            return Ok(false);
        }
        self.remove_at(&segments)
    }

    fn remove_at(&mut self, segments: &[&str]) -> StagingResult<bool> {
        match segments {
            [name] => Ok(self.entries.remove(*name).is_some()),
            [first, rest @ ..] => {
                let Some(child) = self.child_tree_mut(first, false)? else {
                    return Ok(false);
                };
                let removed = child.remove_at(rest)?;
                if removed && child.is_empty() {
                    self.entries.remove(*first);
                }
                Ok(removed)
            }
            [] => Ok(false),
        }
    }
}
