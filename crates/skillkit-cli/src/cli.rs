//! CLI argument definitions for skillkit.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use skillkit_install::NodeManager;

/// skillkit -- install the tools your agent skills depend on.
#[derive(Parser)]
#[command(
    name = "skillkit",
    version,
    about = "Install the binaries SKILL.md skills depend on",
    long_about = "Reads OpenClaw-style SKILL.md manifests from a workspace and runs their \
                  declared install strategies (brew, node, go, uv or download), installing \
                  missing prerequisite binaries from a fixed allow-list."
)]
pub struct Cli {
    /// Workspace directory containing `skills/<name>/SKILL.md`.
    #[arg(long, short, global = true, default_value = ".")]
    pub workspace: PathBuf,

    /// Path to `skillkit.toml` (default: $SKILLKIT_CONFIG or ./skillkit.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Print machine-readable JSON instead of text.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one of a skill's install options.
    Install {
        /// Skill name.
        skill: String,

        /// Install option id (`brew`, `node-1`, ...).  Defaults to the first
        /// declared option.
        #[arg(long)]
        id: Option<String>,

        /// Timeout in milliseconds (clamped to 1000..=900000).
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Node package manager for `node` installs.
        #[arg(long, value_parser = parse_node_manager)]
        node_manager: Option<NodeManager>,

        /// Do not use Homebrew when installing missing prerequisites.
        #[arg(long)]
        no_brew: bool,
    },

    /// List skills in the workspace.
    List,

    /// Show a skill's install options and unmet prerequisites.
    Info {
        /// Skill name.
        skill: String,
    },
}

fn parse_node_manager(s: &str) -> Result<NodeManager, String> {
    s.parse().map_err(|e: skillkit_install::ConfigError| e.to_string())
}
