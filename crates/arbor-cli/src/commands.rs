use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use arbor_stage::{BuiltTree, FsResolver, MergePolicy, StageConfig, StagedTree};
use arbor_store::{EntryMode, InMemoryObjectStore, ObjectStore};
use arbor_types::ObjectId;
use colored::Colorize;
use serde_json::json;
use tracing::info;
use walkdir::WalkDir;

use crate::cli::*;
use crate::plan::Plan;

const DEFAULT_CONFIG: &str = "arbor.toml";

pub fn load_config(path: Option<&Path>) -> anyhow::Result<StageConfig> {
    match path {
        Some(path) if !path.exists() => bail!("config file {} not found", path.display()),
        Some(path) => StageConfig::load(path)
            .with_context(|| format!("failed to load {}", path.display())),
        None => StageConfig::load(Path::new(DEFAULT_CONFIG))
            .with_context(|| format!("failed to load {DEFAULT_CONFIG}")),
    }
}

pub fn run_command(cli: Cli, config: StageConfig) -> anyhow::Result<()> {
    let store: Arc<InMemoryObjectStore> = Arc::new(InMemoryObjectStore::new());
    match cli.command {
        Command::Snapshot(args) => cmd_snapshot(&store, args, cli.format),
        Command::Apply(args) => cmd_apply(&store, args, cli.format, &config),
    }
}

fn cmd_snapshot(
    store: &Arc<InMemoryObjectStore>,
    args: SnapshotArgs,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let shared: Arc<dyn ObjectStore> = store.clone();
    let mut tree = stage_dir(&shared, &args.dir)?;
    let built = tree.build().context("failed to build snapshot")?;
    report(store, &built, &format, args.list)
}

fn cmd_apply(
    store: &Arc<InMemoryObjectStore>,
    args: ApplyArgs,
    format: OutputFormat,
    config: &StageConfig,
) -> anyhow::Result<()> {
    let shared: Arc<dyn ObjectStore> = store.clone();
    let plan = Plan::load(&args.plan)?;

    let mut tree = match &args.base {
        Some(dir) => {
            let base = stage_dir(&shared, dir)?
                .build()
                .context("failed to build base snapshot")?;
            info!(base = %base.id.short_hex(), "base snapshot built");
            StagedTree::open(Arc::clone(&shared), &base.id)?
        }
        None => StagedTree::new(Arc::clone(&shared)),
    };

    let resolver = match (&config.workdir, args.plan.parent()) {
        (Some(_), _) => config.resolver(),
        (None, Some(dir)) => FsResolver::with_root(dir),
        (None, None) => FsResolver::new(),
    };
    let policy = args
        .policy
        .map(MergePolicy::from)
        .unwrap_or(config.merge_policy);

    plan.apply(&mut tree, &resolver, policy)?;
    let built = tree
        .build_with(&resolver)
        .context("failed to build tree")?;
    report(store, &built, &format, true)
}

/// Stage every file under `dir` as a deferred file blob.
///
/// Symlinks are staged as blobs holding their target. Directories are
/// implied by the files they contain, so empty ones are skipped, as is
/// any `.git` directory.
pub(crate) fn stage_dir(store: &Arc<dyn ObjectStore>, dir: &Path) -> anyhow::Result<StagedTree> {
    let root = dir
        .canonicalize()
        .with_context(|| format!("cannot open {}", dir.display()))?;
    let mut tree = StagedTree::new(Arc::clone(store));
    let mut staged = 0usize;

    let walker = WalkDir::new(&root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || e.file_name() != ".git");

    for entry in walker {
        let entry = entry.with_context(|| format!("failed to walk {}", root.display()))?;
        let file_type = entry.file_type();
        if file_type.is_dir() {
            continue;
        }
        let rel = slash_path(entry.path().strip_prefix(&root)?)?;

        if file_type.is_symlink() {
            let target = std::fs::read_link(entry.path())
                .with_context(|| format!("failed to read link {}", entry.path().display()))?;
            tree.add_bytes(
                &rel,
                target.to_string_lossy().as_bytes(),
                EntryMode::Symlink,
            )?;
        } else if file_type.is_file() {
            let metadata = entry.metadata()?;
            let mode = if is_executable(&metadata) {
                EntryMode::Executable
            } else {
                EntryMode::Regular
            };
            tree.add_file(&rel, entry.path(), mode)?;
        } else {
            continue;
        }
        staged += 1;
    }
    info!(dir = %root.display(), files = staged, "directory staged");
    Ok(tree)
}

fn slash_path(rel: &Path) -> anyhow::Result<String> {
    let mut parts = Vec::new();
    for component in rel.components() {
        match component.as_os_str().to_str() {
            Some(part) => parts.push(part),
            None => bail!("path {} is not valid UTF-8", rel.display()),
        }
    }
    Ok(parts.join("/"))
}

#[cfg(unix)]
fn is_executable(metadata: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &std::fs::Metadata) -> bool {
    false
}

struct Listed {
    path: String,
    mode: EntryMode,
    id: ObjectId,
}

fn list_recursive(store: &dyn ObjectStore, id: &ObjectId) -> anyhow::Result<Vec<Listed>> {
    let mut out = Vec::new();
    list_into(store, id, "", &mut out)?;
    Ok(out)
}

fn list_into(
    store: &dyn ObjectStore,
    id: &ObjectId,
    base: &str,
    out: &mut Vec<Listed>,
) -> anyhow::Result<()> {
    let tree = store
        .read_tree(id)?
        .with_context(|| format!("tree {id} missing from store"))?;
    for entry in &tree.entries {
        let path = if base.is_empty() {
            entry.name.clone()
        } else {
            format!("{base}/{}", entry.name)
        };
        let is_dir = entry.mode == EntryMode::Directory;
        out.push(Listed {
            path: path.clone(),
            mode: entry.mode,
            id: entry.object_id,
        });
        if is_dir {
            list_into(store, &entry.object_id, &path, out)?;
        }
    }
    Ok(())
}

fn kind_name(mode: EntryMode) -> &'static str {
    match mode {
        EntryMode::Directory => "tree",
        EntryMode::Gitlink => "commit",
        _ => "blob",
    }
}

fn report(
    store: &InMemoryObjectStore,
    built: &BuiltTree,
    format: &OutputFormat,
    list: bool,
) -> anyhow::Result<()> {
    let entries = if list {
        list_recursive(store, &built.id)?
    } else {
        Vec::new()
    };

    match format {
        OutputFormat::Json => {
            let listed: Vec<_> = entries
                .iter()
                .map(|e| {
                    json!({
                        "path": e.path,
                        "mode": e.mode.to_string(),
                        "kind": kind_name(e.mode),
                        "id": e.id,
                    })
                })
                .collect();
            let out = json!({
                "tree": built.id,
                "objects": store.len(),
                "bytes": store.total_bytes(),
                "entries": listed,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Text => {
            println!("{} Built tree {}", "✓".green().bold(), built.id.to_hex().yellow());
            println!(
                "  Objects: {} ({} bytes)",
                store.len().to_string().bold(),
                store.total_bytes()
            );
            for e in &entries {
                println!(
                    "{} {} {}\t{}",
                    e.mode.to_string().dimmed(),
                    kind_name(e.mode),
                    e.id.short_hex().yellow(),
                    e.path
                );
            }
        }
    }
    Ok(())
}
