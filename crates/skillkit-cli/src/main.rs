//! CLI entry point for skillkit.
//!
//! This binary provides the `skillkit` command: `install` runs one of a
//! skill's install options, `list` shows the workspace's skills and `info`
//! shows a skill's options with their unmet prerequisites.

mod cli;
mod helpers;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use skillkit_install::{
    InstallConfig, InstallRequest, NodeManager, SkillInstaller, WorkspaceLoader,
};
use tracing::debug;

use crate::cli::{Cli, Commands};
use crate::helpers::{init_tracing, render_options, render_result, render_skills};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_tracing(if cli.json { "warn" } else { "info" });

    let config = InstallConfig::load(cli.config.as_deref())
        .context("failed to load skillkit configuration")?;
    debug!(?config, "configuration loaded");

    let installer = SkillInstaller::new(Arc::new(WorkspaceLoader::new()))
        .with_tools_dir(config.tools_dir.clone());

    match cli.command {
        Commands::Install {
            skill,
            id,
            timeout_ms,
            node_manager,
            no_brew,
        } => {
            let overrides = InstallOverrides {
                timeout_ms,
                node_manager,
                no_brew,
            };
            let ok = cmd_install(
                &installer,
                overrides.apply(config),
                &cli.workspace,
                &skill,
                id,
                cli.json,
            )
            .await?;
            if !ok {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::List => cmd_list(&installer, &cli.workspace, cli.json).await,
        Commands::Info { skill } => cmd_info(&installer, &cli.workspace, &skill, cli.json).await,
    }
}

/// Per-invocation flags that take precedence over file and environment.
struct InstallOverrides {
    timeout_ms: Option<u64>,
    node_manager: Option<NodeManager>,
    no_brew: bool,
}

impl InstallOverrides {
    fn apply(self, mut config: InstallConfig) -> InstallConfig {
        if let Some(ms) = self.timeout_ms {
            config = config.with_timeout_ms(ms);
        }
        if let Some(manager) = self.node_manager {
            config = config.with_node_manager(manager);
        }
        if self.no_brew {
            config = config.with_prefer_brew(false);
        }
        config
    }
}

// ---------------------------------------------------------------------------
// Subcommand: install
// ---------------------------------------------------------------------------

async fn cmd_install(
    installer: &SkillInstaller,
    config: InstallConfig,
    workspace: &Path,
    skill: &str,
    id: Option<String>,
    json: bool,
) -> Result<bool> {
    let install_id = match id {
        Some(id) => id,
        None => installer
            .list_options(workspace, skill)
            .await?
            .into_iter()
            .next()
            .map(|option| option.id)
            .with_context(|| format!("skill `{skill}` declares no install options"))?,
    };

    let request = InstallRequest::new(workspace, skill, install_id)
        .with_timeout_ms(config.timeout_ms)
        .with_preferences(config.preferences);
    let result = installer.install(request).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{}", render_result(&result));
    }
    Ok(result.ok)
}

// ---------------------------------------------------------------------------
// Subcommand: list
// ---------------------------------------------------------------------------

async fn cmd_list(installer: &SkillInstaller, workspace: &Path, json: bool) -> Result<()> {
    let skills = installer
        .skills(workspace)
        .await
        .with_context(|| format!("failed to load skills from {}", workspace.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&skills)?);
    } else {
        print!("{}", render_skills(&skills));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: info
// ---------------------------------------------------------------------------

async fn cmd_info(
    installer: &SkillInstaller,
    workspace: &Path,
    skill: &str,
    json: bool,
) -> Result<()> {
    let options = match installer.list_options(workspace, skill).await {
        Ok(options) => options,
        Err(skillkit_install::InstallError::NotFound(message)) => bail!(message),
        Err(e) => return Err(e).context("failed to read skill"),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&options)?);
    } else {
        print!("{}", render_options(skill, &options));
    }
    Ok(())
}
