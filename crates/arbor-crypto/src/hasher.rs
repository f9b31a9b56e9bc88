use arbor_types::ObjectId;

/// Domain-separated BLAKE3 content hasher.
///
/// The domain tag (e.g. `"arbor-blob-v1"`) is fed to the hasher ahead of the
/// payload.
#[derive(Clone, Copy, Debug)]
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for blob payloads.
    pub const BLOB: Self = Self::new("arbor-blob-v1");
    /// Hasher for serialized trees.
    pub const TREE: Self = Self::new("arbor-tree-v1");

    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    fn start(&self) -> blake3::Hasher {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher
    }

    /// Hash a payload held in memory.
    pub fn hash(&self, data: &[u8]) -> ObjectId {
        let mut hasher = self.start();
        hasher.update(data);
        ObjectId::from_hash(*hasher.finalize().as_bytes())
    }

    pub fn verify(&self, data: &[u8], expected: &ObjectId) -> bool {
        self.hash(data) == *expected
    }

    pub fn domain(&self) -> &str {
        self.domain
    }
}
