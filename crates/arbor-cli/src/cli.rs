use std::path::PathBuf;

use arbor_stage::MergePolicy;
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "arbor",
    about = "Arbor: stage, merge, and build content-addressed trees",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file (defaults to ./arbor.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Stage a directory and build it into a tree
    Snapshot(SnapshotArgs),
    /// Apply a TOML plan of add/remove/merge steps and build the result
    Apply(ApplyArgs),
}

#[derive(Args)]
pub struct SnapshotArgs {
    pub dir: PathBuf,
    /// Print every entry of the built tree
    #[arg(long)]
    pub list: bool,
}

#[derive(Args)]
pub struct ApplyArgs {
    pub plan: PathBuf,
    /// Directory to snapshot as the starting tree
    #[arg(long)]
    pub base: Option<PathBuf>,
    /// Policy for merge steps that do not name one
    #[arg(long)]
    pub policy: Option<PolicyArg>,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum PolicyArg {
    Keep,
    Overwrite,
    Throw,
}

impl From<PolicyArg> for MergePolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Keep => MergePolicy::Keep,
            PolicyArg::Overwrite => MergePolicy::Overwrite,
            PolicyArg::Throw => MergePolicy::Throw,
        }
    }
}
