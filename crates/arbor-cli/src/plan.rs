//! Edit plans for `arbor apply`.
//!
//! ```toml
//! [[step]]
//! op = "add"
//! path = "docs/readme.md"
//! text = "hello"
//!
//! [[step]]
//! op = "merge"
//! path = "vendor"
//! dir = "third_party"
//! policy = "keep"
//!
//! [[step]]
//! op = "remove"
//! path = "docs/old.md"
//!
//! [[step]]
//! op = "submodule"
//! path = "deps/libfoo"
//! head = "<64 hex chars>"
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use arbor_stage::{EntryDescriptor, FsResolver, MergePolicy, StagedTree, SubmoduleRef};
use arbor_store::{EntryMode, ObjectStore};
use serde::Deserialize;
use tracing::info;

use crate::commands::stage_dir;

#[derive(Debug, Default, Deserialize)]
pub struct Plan {
    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Step {
    Add(EntrySpec),
    Merge(EntrySpec),
    Remove { path: String },
    Submodule(SubmoduleRef),
}

/// Content for an add or merge step. Exactly one of `text`, `file` and
/// `dir` must be set.
#[derive(Debug, Deserialize)]
pub struct EntrySpec {
    pub path: String,
    pub text: Option<String>,
    pub file: Option<PathBuf>,
    pub dir: Option<PathBuf>,
    #[serde(default)]
    pub executable: bool,
    /// Only meaningful for merge steps.
    pub policy: Option<MergePolicy>,
}

impl Step {
    fn describe(&self) -> String {
        match self {
            Self::Add(spec) => format!("add {}", spec.path),
            Self::Merge(spec) => format!("merge {}", spec.path),
            Self::Remove { path } => format!("remove {path}"),
            Self::Submodule(sub) => format!("submodule {}", sub.path),
        }
    }
}

impl EntrySpec {
    fn descriptor(
        &self,
        store: &Arc<dyn ObjectStore>,
        resolver: &FsResolver,
    ) -> anyhow::Result<EntryDescriptor> {
        let mode = if self.executable {
            EntryMode::Executable
        } else {
            EntryMode::Regular
        };
        let descriptor = match (&self.text, &self.file, &self.dir) {
            (Some(text), None, None) => EntryDescriptor::bytes(text.as_bytes(), mode)?,
            (None, Some(file), None) => EntryDescriptor::file(file, mode)?,
            (None, None, Some(dir)) => {
                EntryDescriptor::staged(stage_dir(store, &resolver.resolve(dir))?)
            }
            _ => bail!("exactly one of `text`, `file` or `dir` must be given"),
        };
        Ok(descriptor)
    }
}

impl Plan {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read plan {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid plan {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Run every step against `tree`, stopping at the first failure.
    pub fn apply(
        &self,
        tree: &mut StagedTree,
        resolver: &FsResolver,
        default_policy: MergePolicy,
    ) -> anyhow::Result<()> {
        for (i, step) in self.steps.iter().enumerate() {
            info!(step = i + 1, action = %step.describe(), "applying");
            self.apply_step(tree, step, resolver, default_policy)
                .with_context(|| format!("step {} ({}) failed", i + 1, step.describe()))?;
        }
        Ok(())
    }

    fn apply_step(
        &self,
        tree: &mut StagedTree,
        step: &Step,
        resolver: &FsResolver,
        default_policy: MergePolicy,
    ) -> anyhow::Result<()> {
        let store = Arc::clone(tree.store());
        match step {
            Step::Add(spec) => tree.add(&spec.path, spec.descriptor(&store, resolver)?)?,
            Step::Merge(spec) => tree.merge(
                &spec.path,
                spec.descriptor(&store, resolver)?,
                spec.policy.unwrap_or(default_policy),
            )?,
            Step::Remove { path } => {
                if !tree.remove(path)? {
                    info!(path = %path, "nothing to remove");
                }
            }
            Step::Submodule(sub) => tree.add_submodule(sub)?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_stage::{EntryKind, StagingError};
    use arbor_store::InMemoryObjectStore;
    use arbor_types::ObjectId;

    fn tree() -> StagedTree {
        StagedTree::new(Arc::new(InMemoryObjectStore::new()))
    }

    #[test]
    fn parses_every_step_kind() {
        let head = ObjectId::from_bytes(b"head");
        let plan = Plan::parse(&format!(
            r#"
            [[step]]
            op = "add"
            path = "a.txt"
            text = "a"
            executable = true

            [[step]]
            op = "merge"
            path = "b"
            file = "b.txt"
            policy = "overwrite"

            [[step]]
            op = "remove"
            path = "c"

            [[step]]
            op = "submodule"
            path = "deps/x"
            head = "{head}"
            "#
        ))
        .unwrap();

        assert_eq!(plan.steps.len(), 4);
        assert!(matches!(&plan.steps[0], Step::Add(s) if s.executable));
        assert!(matches!(
            &plan.steps[1],
            Step::Merge(s) if s.policy == Some(MergePolicy::Overwrite)
        ));
        assert!(matches!(&plan.steps[2], Step::Remove { path } if path == "c"));
        assert!(matches!(&plan.steps[3], Step::Submodule(s) if s.head == Some(head)));
    }

    #[test]
    fn empty_plan_has_no_steps() {
        assert!(Plan::parse("").unwrap().steps.is_empty());
    }

    #[test]
    fn applies_steps_in_order() {
        let plan = Plan::parse(
            r#"
            [[step]]
            op = "add"
            path = "docs/a.md"
            text = "first"

            [[step]]
            op = "merge"
            path = "docs/a.md"
            text = "second"
            policy = "keep"

            [[step]]
            op = "add"
            path = "docs/b.md"
            text = "b"

            [[step]]
            op = "remove"
            path = "docs/b.md"
            "#,
        )
        .unwrap();
        let mut tree = tree();
        plan.apply(&mut tree, &FsResolver::new(), MergePolicy::Throw)
            .unwrap();

        let a = tree.get("docs/a.md").unwrap().unwrap();
        assert_eq!(a.resolved_id(), Some(arbor_store::Blob::id_for(b"first")));
        assert!(!tree.contains("docs/b.md").unwrap());
    }

    #[test]
    fn default_policy_applies_to_unnamed_merges() {
        let plan = Plan::parse(
            r#"
            [[step]]
            op = "add"
            path = "x"
            text = "one"

            [[step]]
            op = "merge"
            path = "x"
            text = "two"
            "#,
        )
        .unwrap();
        let err = plan
            .apply(&mut tree(), &FsResolver::new(), MergePolicy::Throw)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StagingError>(),
            Some(StagingError::MergeConflict { .. })
        ));

        let mut overwritten = tree();
        plan.apply(&mut overwritten, &FsResolver::new(), MergePolicy::Overwrite)
            .unwrap();
        assert_eq!(
            overwritten.get("x").unwrap().unwrap().resolved_id(),
            Some(arbor_store::Blob::id_for(b"two"))
        );
    }

    #[test]
    fn dir_step_merges_a_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("lib/src")).unwrap();
        std::fs::write(dir.path().join("lib/src/main.c"), b"int main;").unwrap();

        let plan = Plan::parse(
            r#"
            [[step]]
            op = "merge"
            path = "vendor/lib"
            dir = "lib"
            "#,
        )
        .unwrap();
        let mut tree = tree();
        plan.apply(&mut tree, &FsResolver::with_root(dir.path()), MergePolicy::Throw)
            .unwrap();
        assert_eq!(
            tree.get("vendor/lib/src/main.c").unwrap().unwrap().kind(),
            EntryKind::Blob
        );
    }

    #[test]
    fn ambiguous_content_is_rejected() {
        let plan = Plan::parse(
            r#"
            [[step]]
            op = "add"
            path = "x"
            text = "a"
            file = "b"
            "#,
        )
        .unwrap();
        assert!(plan
            .apply(&mut tree(), &FsResolver::new(), MergePolicy::Throw)
            .is_err());
    }
}
