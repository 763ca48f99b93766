//! # gitmirror
//!
//! **gitmirror** mirrors remote git repositories into local bare clones
//! suitable for serving by a read-only web frontend, and keeps them in sync
//! across runs.
//!
//! Features:
//! - Repositories defined in a TOML config file, either by explicit clone
//!   URL or by GitHub/Bitbucket/GitLab lookup
//! - `gitmirror sync` mirrors new repositories and updates existing ones
//! - `gitmirror list` shows the configured repositories
//! - Transient credential injection for authenticated clones; secrets never
//!   end up in the mirrored tree
//!
//! This CLI is built with [clap](https://docs.rs/clap).

use anyhow::Result;
use clap::{Parser, Subcommand};
use gitmirror::{cmd_list, cmd_sync};
use std::path::PathBuf;

const DEFAULT_CONFIG_PATH: &str = "/etc/gitmirror/gitmirror.toml";

/// Command-line interface definition.
///
/// Parsed using `clap` derive macros.
#[derive(Parser, Debug)]
#[command(
    name = "gitmirror",
    version,
    about = "mirror remote git repositories for a read-only web frontend",
    arg_required_else_help = true
)]
struct Cli {
    /// Config file path
    #[arg(long, value_name = "PATH", default_value = DEFAULT_CONFIG_PATH, global = true)]
    config: PathBuf,
    /// Enable debug logging (includes git subprocess output)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    cmd: Cmd,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Cmd {
    /// Mirror or update the configured repositories
    Sync {
        /// Rewrite a mismatched origin URL instead of refusing the repository
        #[arg(long)]
        force: bool,
        /// Repository ids to sync (default: all of them)
        repos: Vec<String>,
    },
    /// List the configured repositories
    List,
}

/// CLI entry point.
///
/// Exits non-zero if any repository failed to sync.
fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_secs()
        .init();

    match cli.cmd {
        Cmd::Sync { force, repos } => cmd_sync(&cli.config, &repos, force),
        Cmd::List => cmd_list(&cli.config),
    }
}
