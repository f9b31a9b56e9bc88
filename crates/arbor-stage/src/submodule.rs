//! Submodule references staged as link entries.

use arbor_types::ObjectId;
use serde::{Deserialize, Serialize};

/// A nested repository checked out at some path of the working tree.
pub trait Submodule {
    /// Slash-separated path of the submodule within the parent tree.
    fn path(&self) -> &str;

    /// The commit the submodule currently points at, if it has one.
    fn head_commit(&self) -> Option<ObjectId>;
}

/// A plain submodule description, e.g. parsed from a plan file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmoduleRef {
    pub path: String,
    #[serde(default)]
    pub head: Option<ObjectId>,
}

impl SubmoduleRef {
    pub fn new(path: impl Into<String>, head: Option<ObjectId>) -> Self {
        Self {
            path: path.into(),
            head,
        }
    }
}

impl Submodule for SubmoduleRef {
    fn path(&self) -> &str {
        &self.path
    }

    fn head_commit(&self) -> Option<ObjectId> {
        self.head
    }
}
