use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "gitres",
    about = "Resolve git repositories, refs and common ancestors",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// TOML file with resolver settings
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Resolve a repository and show its HEAD
    Resolve(ResolveArgs),
    /// Resolve a branch, tag, ref or commit
    Ref(RefArgs),
    /// List tags
    Tags(ListArgs),
    /// List branches
    Branches(ListArgs),
    /// Find the best common ancestor of two refs
    MergeBase(MergeBaseArgs),
    /// Resolve the tag with the highest semantic version
    LatestVersion(ResolveArgs),
}

/// How to reach a repository.
#[derive(Args, Clone, Debug)]
pub struct RepoArgs {
    /// `host/org/repo`, a URL, or a path with --local
    pub repo: String,

    /// Treat REPO as a local working copy
    #[arg(long)]
    pub local: bool,

    /// Environment variable holding an HTTP token
    #[arg(long, value_name = "VAR")]
    pub token_env: Option<String>,

    /// Username sent with the HTTP token
    #[arg(long)]
    pub username: Option<String>,

    /// Use the ssh agent at SSH_AUTH_SOCK
    #[arg(long)]
    pub ssh_agent: bool,

    /// Pin HEAD to this commit
    #[arg(long)]
    pub commit: Option<String>,

    #[arg(long)]
    pub keep_git_dir: bool,
}

#[derive(Args)]
pub struct ResolveArgs {
    #[command(flatten)]
    pub repo: RepoArgs,
}

#[derive(Args)]
pub struct RefArgs {
    #[command(flatten)]
    pub repo: RepoArgs,
    /// Branch, tag, full ref name or commit SHA
    pub name: String,
}

#[derive(Args)]
pub struct ListArgs {
    #[command(flatten)]
    pub repo: RepoArgs,
    /// Glob patterns matched against ref name suffixes
    pub patterns: Vec<String>,
}

#[derive(Args)]
pub struct MergeBaseArgs {
    #[command(flatten)]
    pub repo: RepoArgs,
    pub left: String,
    pub right: String,
}
