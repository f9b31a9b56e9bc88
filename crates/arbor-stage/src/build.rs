//! Writing a staged tree back to the store, depth first.

use arbor_store::{Tree, TreeBuilder};
use arbor_types::ObjectId;

use crate::entry::EntryTarget;
use crate::error::{StagingError, StagingResult};
use crate::resolver::{read_source, ContentResolver, FsResolver};
use crate::tree::StagedTree;

/// The persisted result of [`StagedTree::build`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuiltTree {
    pub id: ObjectId,
    pub tree: Tree,
}

impl StagedTree {
    /// Build with file sources resolved against the working directory.
    pub fn build(&mut self) -> StagingResult<BuiltTree> {
        self.build_with(&FsResolver::new())
    }

    /// Persist every open subtree and deferred blob, then this tree.
    ///
    /// Afterwards every entry is persisted and no subtree is open. The tree
    /// stays usable: further edits reopen subtrees from the store, and a
    /// rebuild without edits writes nothing new and returns the same id.
    pub fn build_with(&mut self, resolver: &dyn ContentResolver) -> StagingResult<BuiltTree> {
        let id = self.write_tree(resolver)?;
        match self.store.read_tree(&id) {
            Ok(Some(tree)) => Ok(BuiltTree { id, tree }),
            Ok(None) => Err(StagingError::Persistence(format!(
                "tree {id} was written but cannot be found"
            ))),
            Err(e) => Err(StagingError::Persistence(format!(
                "tree {id} was written but cannot be read back: {e}"
            ))),
        }
    }

    fn write_tree(&mut self, resolver: &dyn ContentResolver) -> StagingResult<ObjectId> {
        for entry in self.entries.values_mut() {
            if let Some(child) = entry.pending_tree_mut() {
                let id = child.write_tree(resolver)?;
                entry.settle(id);
            }
        }

        for (name, entry) in self.entries.iter_mut() {
            let id = match entry.target() {
                EntryTarget::Deferred(source) => self
                    .store
                    .write_blob(read_source(source, resolver)?)
                    .map_err(|e| {
                        StagingError::Persistence(format!("failed to write blob {name:?}: {e}"))
                    })?,
                _ => continue,
            };
            entry.settle(id);
        }

        let mut builder = TreeBuilder::new(self.store.as_ref());
        for (name, entry) in &self.entries {
            let id = entry.persisted_id().ok_or_else(|| {
                StagingError::Persistence(format!("entry {name:?} has no persisted id"))
            })?;
            builder.insert(name, entry.mode(), id)?;
        }
        builder
            .write()
            .map_err(|e| StagingError::Persistence(format!("failed to write tree: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::io::{self, Read};
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    use arbor_store::{
        Blob, EntryMode, InMemoryObjectStore, ObjectKind, ObjectStore, StoreError, StoreResult,
        StoredObject,
    };

    use super::*;
    use crate::entry::{EntryDescriptor, EntryKind};
    use crate::merge::MergePolicy;

    fn mem() -> Arc<InMemoryObjectStore> {
        Arc::new(InMemoryObjectStore::new())
    }

    fn shared(store: &Arc<InMemoryObjectStore>) -> Arc<dyn ObjectStore> {
        Arc::clone(store) as Arc<dyn ObjectStore>
    }

    fn staged(store: &Arc<InMemoryObjectStore>) -> StagedTree {
        StagedTree::new(shared(store))
    }

    /// Every blob and link under `id` as `(path, mode, id)`, depth first.
    fn walk(store: &dyn ObjectStore, id: &ObjectId) -> Vec<(String, EntryMode, ObjectId)> {
        let mut out = Vec::new();
        walk_into(store, id, "", &mut out);
        out
    }

    fn walk_into(
        store: &dyn ObjectStore,
        id: &ObjectId,
        base: &str,
        out: &mut Vec<(String, EntryMode, ObjectId)>,
    ) {
        let tree = store.read_tree(id).unwrap().unwrap();
        for entry in &tree.entries {
            let path = crate::path::join(base, &entry.name);
            if entry.mode == EntryMode::Directory {
                walk_into(store, &entry.object_id, &path, out);
            } else {
                out.push((path, entry.mode, entry.object_id));
            }
        }
    }

    struct CountingResolver {
        opened: Cell<usize>,
    }

    impl ContentResolver for CountingResolver {
        fn open(&self, path: &Path) -> io::Result<Box<dyn Read + '_>> {
            self.opened.set(self.opened.get() + 1);
            let body = format!("contents of {}", path.display()).into_bytes();
            Ok(Box::new(io::Cursor::new(body)))
        }
    }

    /// Accepts writes but never finds anything afterwards.
    struct ForgetfulStore;

    impl ObjectStore for ForgetfulStore {
        fn read(&self, _: &ObjectId) -> StoreResult<Option<StoredObject>> {
            Ok(None)
        }

        fn write(&self, object: &StoredObject) -> StoreResult<ObjectId> {
            Ok(object.compute_id())
        }

        fn exists(&self, _: &ObjectId) -> StoreResult<bool> {
            Ok(false)
        }
    }

    /// Rejects writes of one object kind while `failing` holds it.
    struct FlakyStore {
        inner: InMemoryObjectStore,
        failing: Mutex<Option<ObjectKind>>,
    }

    impl FlakyStore {
        fn failing(kind: ObjectKind) -> Arc<Self> {
            Arc::new(Self {
                inner: InMemoryObjectStore::new(),
                failing: Mutex::new(Some(kind)),
            })
        }

        fn recover(&self) {
            *self.failing.lock().unwrap() = None;
        }
    }

    impl ObjectStore for FlakyStore {
        fn read(&self, id: &ObjectId) -> StoreResult<Option<StoredObject>> {
            self.inner.read(id)
        }

        fn write(&self, object: &StoredObject) -> StoreResult<ObjectId> {
            if *self.failing.lock().unwrap() == Some(object.kind) {
                return Err(StoreError::Io(io::Error::other("disk full")));
            }
            self.inner.write(object)
        }

        fn exists(&self, id: &ObjectId) -> StoreResult<bool> {
            self.inner.exists(id)
        }
    }

    #[test]
    fn nested_add_builds_nested_trees() {
        let store = mem();
        let blob = store.write_blob(b"body".to_vec()).unwrap();
        let mut tree = staged(&store);
        tree.add_blob("dir/file.txt", blob, EntryMode::Regular).unwrap();

        let built = tree.build().unwrap();
        let dir = built.tree.get("dir").unwrap();
        assert_eq!(dir.mode, EntryMode::Directory);
        let inner = store.read_tree(&dir.object_id).unwrap().unwrap();
        assert_eq!(inner.get("file.txt").unwrap().object_id, blob);
        assert_eq!(inner.get("file.txt").unwrap().mode, EntryMode::Regular);
    }

    #[test]
    fn build_settles_every_entry() {
        let store = mem();
        let mut tree = staged(&store);
        tree.add_bytes("a/b/c.txt", b"c".to_vec(), EntryMode::Regular)
            .unwrap();
        tree.add_bytes("top", b"t".to_vec(), EntryMode::Executable)
            .unwrap();
        assert_eq!(tree.unwrapped_names(), ["a"]);

        tree.build().unwrap();
        assert!(tree.unwrapped_names().is_empty());
        assert!(tree.iter().all(|(_, e)| e.persisted_id().is_some()));
        assert_eq!(
            tree.get("a/b/c.txt").unwrap().unwrap().persisted_id(),
            Some(Blob::id_for(b"c"))
        );
    }

    #[test]
    fn persisted_tree_round_trips() {
        let store = mem();
        let mut original = staged(&store);
        original
            .add_bytes("src/lib.rs", b"pub fn x() {}".to_vec(), EntryMode::Regular)
            .unwrap();
        original
            .add_bytes("bin/run", b"#!/bin/sh".to_vec(), EntryMode::Executable)
            .unwrap();
        original
            .add_link("vendor/dep", ObjectId::from_bytes(b"dep"))
            .unwrap();
        let first = original.build().unwrap();

        let mut reopened = StagedTree::open(shared(&store), &first.id).unwrap();
        let objects = store.len();
        let second = reopened.build().unwrap();
        assert_eq!(second, first);
        assert_eq!(store.len(), objects);
    }

    #[test]
    fn rebuild_without_edits_is_stable() {
        let store = mem();
        let mut tree = staged(&store);
        tree.add_bytes("a/x", b"x".to_vec(), EntryMode::Regular).unwrap();
        let first = tree.build().unwrap();
        let second = tree.build().unwrap();
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn tree_stays_editable_after_build() {
        let store = mem();
        let mut tree = staged(&store);
        tree.add_bytes("a/x", b"x".to_vec(), EntryMode::Regular).unwrap();
        let first = tree.build().unwrap();

        tree.add_bytes("a/y", b"y".to_vec(), EntryMode::Regular).unwrap();
        let second = tree.build().unwrap();
        assert_ne!(first.id, second.id);
        let paths: Vec<_> = walk(store.as_ref(), &second.id)
            .into_iter()
            .map(|(p, _, _)| p)
            .collect();
        assert_eq!(paths, ["a/x", "a/y"]);

        tree.remove("a/y").unwrap();
        assert_eq!(tree.build().unwrap().id, first.id);
    }

    #[test]
    fn deferred_files_are_read_once_at_build() {
        let store = mem();
        let resolver = CountingResolver {
            opened: Cell::new(0),
        };
        let mut tree = staged(&store);
        tree.add_file("one.txt", "src/one.txt", EntryMode::Regular)
            .unwrap();
        tree.add_file("deep/two.txt", "src/two.txt", EntryMode::Regular)
            .unwrap();
        assert_eq!(resolver.opened.get(), 0);

        let built = tree.build_with(&resolver).unwrap();
        assert_eq!(resolver.opened.get(), 2);
        tree.build_with(&resolver).unwrap();
        assert_eq!(resolver.opened.get(), 2);

        let one = built.tree.get("one.txt").unwrap();
        assert_eq!(
            store.read_blob(&one.object_id).unwrap().unwrap(),
            b"contents of src/one.txt"
        );
    }

    #[test]
    fn file_source_is_read_at_build_not_add() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("late.txt");
        std::fs::write(&file, b"early").unwrap();

        let store = mem();
        let mut tree = staged(&store);
        tree.add_file("late.txt", &file, EntryMode::Regular).unwrap();
        std::fs::write(&file, b"late").unwrap();

        let built = tree.build().unwrap();
        let entry = built.tree.get("late.txt").unwrap();
        assert_eq!(entry.object_id, Blob::id_for(b"late"));
    }

    #[test]
    fn relative_file_sources_use_resolver_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("docs")).unwrap();
        std::fs::write(dir.path().join("docs/readme.md"), b"# readme").unwrap();

        let store = mem();
        let mut tree = staged(&store);
        tree.add_file("README.md", "docs/readme.md", EntryMode::Regular)
            .unwrap();
        let built = tree.build_with(&FsResolver::with_root(dir.path())).unwrap();
        assert_eq!(
            built.tree.get("README.md").unwrap().object_id,
            Blob::id_for(b"# readme")
        );
    }

    #[test]
    fn missing_file_source_fails_build() {
        let dir = tempfile::tempdir().unwrap();
        let store = mem();
        let mut tree = staged(&store);
        tree.add_file("gone", dir.path().join("gone"), EntryMode::Regular)
            .unwrap();
        assert!(matches!(
            tree.build(),
            Err(StagingError::BlobSource { .. })
        ));
        assert_eq!(store.count(ObjectKind::Tree), 0);
    }

    #[test]
    fn unresolvable_result_is_persistence_error() {
        let mut tree = StagedTree::new(Arc::new(ForgetfulStore));
        tree.add_bytes("x", b"x".to_vec(), EntryMode::Regular).unwrap();
        assert!(matches!(
            tree.build(),
            Err(StagingError::Persistence(_))
        ));
    }

    #[test]
    fn failed_blob_write_is_persistence_error() {
        let store = FlakyStore::failing(ObjectKind::Blob);
        let mut tree = StagedTree::new(Arc::clone(&store) as Arc<dyn ObjectStore>);
        tree.add_bytes("x", b"x".to_vec(), EntryMode::Regular).unwrap();

        assert!(matches!(tree.build(), Err(StagingError::Persistence(_))));
        assert!(tree.get("x").unwrap().unwrap().persisted_id().is_none());
        assert_eq!(store.inner.count(ObjectKind::Tree), 0);

        store.recover();
        let built = tree.build().unwrap();
        assert_eq!(built.tree.get("x").unwrap().object_id, Blob::id_for(b"x"));
    }

    #[test]
    fn failed_tree_write_is_persistence_error() {
        let store = FlakyStore::failing(ObjectKind::Tree);
        let mut tree = StagedTree::new(Arc::clone(&store) as Arc<dyn ObjectStore>);
        tree.add_bytes("dir/x", b"x".to_vec(), EntryMode::Regular)
            .unwrap();

        assert!(matches!(tree.build(), Err(StagingError::Persistence(_))));
        assert_eq!(store.inner.count(ObjectKind::Tree), 0);

        // The aborted session leaves the tree buildable once writes succeed.
        store.recover();
        let built = tree.build().unwrap();
        assert_eq!(built.tree.get("dir").unwrap().mode, EntryMode::Directory);
        assert_eq!(store.inner.count(ObjectKind::Tree), 2);
    }

    #[test]
    fn empty_tree_builds() {
        let store = mem();
        let built = staged(&store).build().unwrap();
        assert!(built.tree.is_empty());
        assert_eq!(built.id, Tree::empty().to_stored_object().unwrap().compute_id());
    }

    #[test]
    fn links_and_modes_survive_build() {
        let store = mem();
        let commit = ObjectId::from_bytes(b"upstream");
        let mut tree = staged(&store);
        tree.add_link("ext/lib", commit).unwrap();
        tree.add_bytes("ext/run.sh", b"echo".to_vec(), EntryMode::Executable)
            .unwrap();
        tree.add_bytes("ext/alias", b"run.sh".to_vec(), EntryMode::Symlink)
            .unwrap();
        let built = tree.build().unwrap();

        let listing = walk(store.as_ref(), &built.id);
        assert_eq!(
            listing,
            [
                ("ext/alias".to_string(), EntryMode::Symlink, Blob::id_for(b"run.sh")),
                ("ext/lib".to_string(), EntryMode::Gitlink, commit),
                ("ext/run.sh".to_string(), EntryMode::Executable, Blob::id_for(b"echo")),
            ]
        );
        assert!(!store.exists(&commit).unwrap());
    }

    #[test]
    fn merged_and_removed_edits_reach_the_build() {
        let store = mem();
        let mut base = staged(&store);
        base.add_bytes("keep/a", b"a".to_vec(), EntryMode::Regular).unwrap();
        base.add_bytes("drop/b", b"b".to_vec(), EntryMode::Regular).unwrap();
        let base = base.build().unwrap();

        let mut tree = StagedTree::open(shared(&store), &base.id).unwrap();
        tree.remove("drop/b").unwrap();
        tree.merge(
            "keep/c",
            EntryDescriptor::bytes(b"c".to_vec(), EntryMode::Regular).unwrap(),
            MergePolicy::Throw,
        )
        .unwrap();
        let built = tree.build().unwrap();

        let paths: Vec<_> = walk(store.as_ref(), &built.id)
            .into_iter()
            .map(|(p, _, _)| p)
            .collect();
        assert_eq!(paths, ["keep/a", "keep/c"]);
        assert_eq!(tree.get("keep").unwrap().unwrap().kind(), EntryKind::Tree);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn staged_paths_round_trip_through_store(
                files in proptest::collection::btree_map(
                    "[a-d]{1,3}(/[a-d]{1,3}){0,3}",
                    proptest::collection::vec(any::<u8>(), 0..16),
                    1..12,
                ),
            ) {
                let store = mem();
                let mut tree = staged(&store);
                for (path, data) in &files {
                    tree.add_bytes(path, data.clone(), EntryMode::Regular).unwrap();
                }
                // A later add of "a/b" turns an earlier blob "a" into a
                // directory, so only surviving blobs are expected.
                let mut expected = Vec::new();
                for (path, data) in &files {
                    if let Some(entry) = tree.get(path).unwrap() {
                        if entry.kind() == EntryKind::Blob {
                            expected.push((path.clone(), EntryMode::Regular, Blob::id_for(data)));
                        }
                    }
                }

                let built = tree.build().unwrap();
                let mut actual = walk(store.as_ref(), &built.id);
                actual.sort_by(|a, b| a.0.cmp(&b.0));
                expected.sort_by(|a, b| a.0.cmp(&b.0));
                prop_assert_eq!(actual, expected);

                let mut reopened = StagedTree::open(shared(&store), &built.id).unwrap();
                prop_assert_eq!(reopened.build().unwrap().id, built.id);
            }
        }
    }
}
