//! Reading deferred blob content at build time.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use tracing::trace;

use crate::entry::BlobSource;
use crate::error::{StagingError, StagingResult};

/// Opens file-backed blob sources.
///
/// [`StagedTree::build_with`](crate::StagedTree::build_with) calls `open` at
/// most once per deferred file entry per build.
pub trait ContentResolver {
    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + '_>>;
}

/// Resolves source paths on the local filesystem, relative paths against
/// an optional root.
#[derive(Clone, Debug, Default)]
pub struct FsResolver {
    root: Option<PathBuf>,
}

impl FsResolver {
    /// Resolve relative paths against the process working directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative paths against `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// The path that `open` will read for `path`.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl ContentResolver for FsResolver {
    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + '_>> {
        Ok(Box::new(File::open(self.resolve(path))?))
    }
}

/// Materialize the bytes of a deferred blob.
pub(crate) fn read_source(
    source: &BlobSource,
    resolver: &dyn ContentResolver,
) -> StagingResult<Vec<u8>> {
    match source {
        BlobSource::Bytes(data) => Ok(data.clone()),
        BlobSource::File(path) => {
            let wrap = |source| StagingError::BlobSource {
                path: path.clone(),
                source,
            };
            let mut reader = resolver.open(path).map_err(wrap)?;
            let mut data = Vec::new();
            reader.read_to_end(&mut data).map_err(wrap)?;
            trace!(path = %path.display(), bytes = data.len(), "deferred blob resolved");
            Ok(data)
        }
    }
}
