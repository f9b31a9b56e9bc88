//! Policy-driven merges into a staged tree.
//!
//! Trees never conflict: a tree merged onto a tree composes child by child.
//! Two differing non-tree entries under one name are resolved by the
//! [`MergePolicy`]. A tree colliding with a non-tree is a
//! [`StagingError::KindMismatch`].
//!
//! Merges are not transactional. When a merge fails part way, the entries
//! merged before the failure stay applied.

use std::collections::BTreeMap;
use std::sync::Arc;

use arbor_types::ObjectId;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::entry::{EntryDescriptor, EntryTarget};
use crate::error::{StagingError, StagingResult};
use crate::path;
use crate::tree::StagedTree;

/// What to do when two differing non-tree entries share a name.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergePolicy {
    /// The existing entry wins.
    Keep,
    /// The incoming entry wins.
    Overwrite,
    /// Fail with [`StagingError::MergeConflict`].
    #[default]
    Throw,
}

impl std::fmt::Display for MergePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Keep => write!(f, "keep"),
            Self::Overwrite => write!(f, "overwrite"),
            Self::Throw => write!(f, "throw"),
        }
    }
}

impl StagedTree {
    /// Merge `descriptor` into the entry at `path`.
    ///
    /// Intermediate directories are created (or forced) as for
    /// [`StagedTree::add`]. An empty `path` with a tree descriptor splices
    /// that tree's children into this one.
    pub fn merge(
        &mut self,
        path: &str,
        descriptor: EntryDescriptor,
        policy: MergePolicy,
    ) -> StagingResult<()> {
        if path.is_empty() && descriptor.is_tree() {
            return self.merge_contents("", descriptor, policy);
        }
        let segments = path::split(path)?;
        self.merge_at("", &segments, descriptor, policy)
    }

    /// Merge every entry of the persisted tree `id` into this tree's root.
    pub fn merge_tree(&mut self, id: &ObjectId, policy: MergePolicy) -> StagingResult<()> {
        let other = Self::open(Arc::clone(&self.store), id)?;
        self.merge_children("", other.entries, policy)
    }

    /// Merge every entry of another staged tree into this tree's root.
    pub fn merge_staged(&mut self, other: StagedTree, policy: MergePolicy) -> StagingResult<()> {
        self.merge_children("", other.entries, policy)
    }

    fn merge_at(
        &mut self,
        base: &str,
        segments: &[&str],
        descriptor: EntryDescriptor,
        policy: MergePolicy,
    ) -> StagingResult<()> {
        match segments {
            [name] => self.merge_entry(base, name, descriptor, policy),
            [first, rest @ ..] => {
                let base = path::join(base, first);
                self.child_tree_or_create(first)?
                    .merge_at(&base, rest, descriptor, policy)
            }
            [] => Ok(()),
        }
    }

    /// Splice the children of the tree `descriptor` into this tree.
    pub(crate) fn merge_contents(
        &mut self,
        base: &str,
        descriptor: EntryDescriptor,
        policy: MergePolicy,
    ) -> StagingResult<()> {
        let children = self.children_of(descriptor)?;
        self.merge_children(base, children, policy)
    }

    fn merge_children(
        &mut self,
        base: &str,
        children: BTreeMap<String, EntryDescriptor>,
        policy: MergePolicy,
    ) -> StagingResult<()> {
        for (name, incoming) in children {
            self.merge_entry(base, &name, incoming, policy)?;
        }
        Ok(())
    }

    fn children_of(
        &self,
        descriptor: EntryDescriptor,
    ) -> StagingResult<BTreeMap<String, EntryDescriptor>> {
        if !descriptor.is_tree() {
            return Err(StagingError::InvalidArgument(format!(
                "only a tree can be spliced, got a {}",
                descriptor.kind()
            )));
        }
        match descriptor.into_target() {
            EntryTarget::Pending(tree) => Ok(tree.entries),
            EntryTarget::Persisted(id) => Ok(Self::open(Arc::clone(&self.store), &id)?.entries),
            EntryTarget::Deferred(_) => Err(StagingError::InvalidArgument(
                "a tree cannot have deferred content".into(),
            )),
        }
    }

    fn merge_entry(
        &mut self,
        base: &str,
        name: &str,
        incoming: EntryDescriptor,
        policy: MergePolicy,
    ) -> StagingResult<()> {
        let Some(existing) = self.entries.get(name) else {
            self.entries.insert(name.to_string(), incoming);
            return Ok(());
        };
        let existing_kind = existing.kind();
        let same = existing.same_content(&incoming);
        let path = path::join(base, name);

        match (existing.is_tree(), incoming.is_tree()) {
            (true, true) if same => Ok(()),
            (true, true) => {
                let children = self.children_of(incoming)?;
                self.child_tree_or_create(name)?
                    .merge_children(&path, children, policy)
            }
            (false, false) if same => Ok(()),
            (false, false) => match policy {
                MergePolicy::Keep => {
                    debug!(path = %path, "merge kept existing entry");
                    Ok(())
                }
                MergePolicy::Overwrite => {
                    debug!(path = %path, "merge overwrote entry");
                    self.entries.insert(name.to_string(), incoming);
                    Ok(())
                }
                MergePolicy::Throw => Err(StagingError::MergeConflict { path }),
            },
            _ => Err(StagingError::KindMismatch {
                path,
                existing: existing_kind,
                incoming: incoming.kind(),
            }),
        }
    }
}
