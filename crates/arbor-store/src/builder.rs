//! Tree-builder session: collect `(name, mode, id)` insertions, then write
//! them as one tree object.

use std::collections::BTreeMap;

use arbor_types::ObjectId;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::object::{EntryMode, Tree, TreeEntry};
use crate::traits::ObjectStore;

/// A single tree write in progress.
///
/// The session borrows its store and cannot outlive it. `write` consumes the
/// session; dropping it without writing discards the insertions.
pub struct TreeBuilder<'s> {
    store: &'s dyn ObjectStore,
    entries: BTreeMap<String, TreeEntry>,
}

impl<'s> TreeBuilder<'s> {
    pub fn new(store: &'s dyn ObjectStore) -> Self {
        Self {
            store,
            entries: BTreeMap::new(),
        }
    }

    /// Insert or replace the entry called `name`.
    pub fn insert(
        &mut self,
        name: &str,
        mode: EntryMode,
        object_id: ObjectId,
    ) -> StoreResult<&mut Self> {
        validate_entry_name(name)?;
        self.entries
            .insert(name.to_string(), TreeEntry::new(mode, name, object_id));
        Ok(self)
    }

    /// Drop a pending insertion. Returns `true` if `name` was present.
    pub fn remove(&mut self, name: &str) -> bool {
        self.entries.remove(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize the collected entries and write them as a tree.
    pub fn write(self) -> StoreResult<ObjectId> {
        let count = self.entries.len();
        let tree = Tree::new(self.entries.into_values().collect());
        let id = self.store.write(&tree.to_stored_object()?)?;
        debug!(tree = %id.short_hex(), entries = count, "tree written");
        Ok(id)
    }
}

impl std::fmt::Debug for TreeBuilder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeBuilder")
            .field("entries", &self.entries.len())
            .finish()
    }
}

fn validate_entry_name(name: &str) -> StoreResult<()> {
    let reason = if name.is_empty() {
        "name must not be empty"
    } else if name.contains('/') {
        "name must not contain '/'"
    } else if name.contains('\0') {
        "name must not contain NUL"
    } else {
        return Ok(());
    };
    Err(StoreError::InvalidEntryName {
        name: name.to_string(),
        reason: reason.into(),
    })
}
