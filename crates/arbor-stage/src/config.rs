//! Staging configuration, read from TOML.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::merge::MergePolicy;
use crate::resolver::FsResolver;

/// Errors raised while loading a [`StageConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Settings shared by callers that stage trees.
///
/// ```toml
/// workdir = "/src/project"
/// merge_policy = "keep"
/// log_level = "debug"
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    /// Root against which relative file sources are resolved.
    pub workdir: Option<PathBuf>,
    /// Policy for merges that do not name one.
    pub merge_policy: MergePolicy,
    /// Default `tracing` filter directive.
    pub log_level: String,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            workdir: None,
            merge_policy: MergePolicy::default(),
            log_level: "warn".to_string(),
        }
    }
}

impl StageConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml_str(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// A resolver rooted at `workdir`, if one is set.
    pub fn resolver(&self) -> FsResolver {
        match &self.workdir {
            Some(root) => FsResolver::with_root(root),
            None => FsResolver::new(),
        }
    }
}
