use arbor_types::ObjectId;

use crate::error::{StoreError, StoreResult};
use crate::object::{Blob, ObjectKind, StoredObject, Tree};

/// Content-addressed object store.
///
/// All implementations must satisfy these invariants:
/// - Objects are immutable once written; the same data always produces the
///   same ID.
/// - Concurrent reads are always safe.
/// - The store never interprets object contents beyond the kind tag.
/// - All I/O errors are propagated, never silently ignored.
pub trait ObjectStore: Send + Sync {
    /// Read an object by its content-addressed ID.
    ///
    /// Returns `Ok(None)` if the object does not exist.
    fn read(&self, id: &ObjectId) -> StoreResult<Option<StoredObject>>;

    /// Write an object and return its content-addressed ID.
    ///
    /// Writing an object that already exists is a no-op.
    fn write(&self, object: &StoredObject) -> StoreResult<ObjectId>;

    /// Check whether an object exists in the store.
    fn exists(&self, id: &ObjectId) -> StoreResult<bool>;

    /// Write raw bytes as a blob.
    fn write_blob(&self, data: Vec<u8>) -> StoreResult<ObjectId> {
        self.write(&Blob::new(data).into_stored_object())
    }

    /// Look up a tree by ID.
    ///
    /// Returns `Ok(None)` if nothing is stored under `id`, and
    /// `CorruptObject` if the object there is not a tree.
    fn read_tree(&self, id: &ObjectId) -> StoreResult<Option<Tree>> {
        match self.read(id)? {
            Some(obj) => Tree::from_stored_object(&obj).map(Some),
            None => Ok(None),
        }
    }

    /// Look up a blob's bytes by ID.
    fn read_blob(&self, id: &ObjectId) -> StoreResult<Option<Vec<u8>>> {
        match self.read(id)? {
            Some(obj) if obj.kind == ObjectKind::Blob => Ok(Some(obj.data)),
            Some(obj) => Err(StoreError::CorruptObject {
                id: *id,
                reason: format!("expected blob, got {}", obj.kind),
            }),
            None => Ok(None),
        }
    }
}
