//! Skill dependency installer, compatible with the OpenClaw SKILL.md format.
//!
//! A skill's manifest declares the binaries it needs and one or more ways to
//! obtain them (`brew`, `node`, `go`, `uv` or a `download`).  This crate
//! picks the requested strategy, installs any missing prerequisite binaries
//! from a closed allow-list, runs the package manager under a timeout and
//! condenses the outcome into a single [`InstallResult`].
//!
//! Side effects go through small traits so callers can substitute them:
//!
//! - [`ManifestLoader`]: where skills come from ([`WorkspaceLoader`]).
//! - [`CommandRunner`]: how subprocesses run ([`ProcessRunner`]).
//! - [`Fetcher`]: network access for downloads ([`GuardedFetcher`]).
//! - [`HostEnv`]: PATH lookup, platform and privileges ([`SystemHost`]).
//! - [`SecurityScanner`]: advisory pre-install scan ([`NoopScanner`]).
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use skillkit_install::{InstallRequest, SkillInstaller, WorkspaceLoader};
//!
//! # async fn run() {
//! let installer = SkillInstaller::new(Arc::new(WorkspaceLoader::new()));
//! let result = installer
//!     .install(InstallRequest::new(".", "github", "brew"))
//!     .await;
//! println!("{}: {}", result.ok, result.message);
//! # }
//! ```

pub mod archive;
pub mod config;
pub mod error;
pub mod fetch;
pub mod format;
pub mod host;
pub mod installer;
pub mod loader;
pub mod parser;
pub mod prereq;
pub mod runner;
pub mod scanner;
pub mod strategy;
pub mod types;

pub use config::{InstallConfig, clamp_timeout_ms};
pub use error::{
    ConfigError, ExtractionError, FetchError, InstallError, PrereqError, Result, ScanError,
    SkillError,
};
pub use fetch::{FetchResponse, Fetcher, GuardedFetcher};
pub use format::format_install_failure_message;
pub use host::{HostEnv, Platform, SystemHost};
pub use installer::SkillInstaller;
pub use loader::{ManifestLoader, WorkspaceLoader};
pub use parser::parse_skill_md;
pub use runner::{CommandOutput, CommandRunner, ProcessRunner, RunOptions};
pub use scanner::{NoopScanner, ScanFinding, ScanSummary, SecurityScanner, Severity};
pub use strategy::build_install_command;
pub use types::{
    ArchiveType, InstallKind, InstallOption, InstallPreferences, InstallRequest, InstallResult,
    InstallSpec, NodeManager, PrereqInstallAttempt, SkillEntry, SkillRequirements,
};
