//! Installer configuration.
//!
//! [`InstallConfig`] carries the caller-level defaults for every install:
//! package-manager preferences, the default timeout and the directory that
//! `download` installs unpack into.  Values come from (lowest to highest
//! priority) built-in defaults, a TOML file, and `SKILLKIT_*` environment
//! variables; the CLI applies its flags on top.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::types::{InstallPreferences, NodeManager};

/// Smallest accepted per-install timeout.
pub const MIN_TIMEOUT_MS: u64 = 1_000;

/// Largest accepted per-install timeout (15 minutes).
pub const MAX_TIMEOUT_MS: u64 = 900_000;

/// Timeout used when the caller does not ask for one (5 minutes).
pub const DEFAULT_TIMEOUT_MS: u64 = 300_000;

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "skillkit.toml";

/// Clamp a requested timeout into `[MIN_TIMEOUT_MS, MAX_TIMEOUT_MS]`.
pub fn clamp_timeout_ms(requested: Option<u64>) -> u64 {
    requested
        .unwrap_or(DEFAULT_TIMEOUT_MS)
        .clamp(MIN_TIMEOUT_MS, MAX_TIMEOUT_MS)
}

/// [`clamp_timeout_ms`] as a [`Duration`].
pub fn clamp_timeout(requested: Option<u64>) -> Duration {
    Duration::from_millis(clamp_timeout_ms(requested))
}

/// Installer defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallConfig {
    /// Package-manager preferences.
    ///
    /// Default: npm, prefer brew.
    pub preferences: InstallPreferences,

    /// Timeout for a single install, in milliseconds.  Clamped on use.
    ///
    /// Default: **300 000 ms**.
    pub timeout_ms: u64,

    /// Root directory for `download` installs without an explicit target.
    ///
    /// Default: `~/.skillkit/tools`.
    pub tools_dir: PathBuf,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            preferences: InstallPreferences::default(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            tools_dir: default_tools_dir(),
        }
    }
}

/// On-disk shape of `skillkit.toml`.
#[derive(Debug, Default, Deserialize)]
struct RawConfigFile {
    #[serde(default)]
    install: RawInstallSection,
}

#[derive(Debug, Default, Deserialize)]
struct RawInstallSection {
    node_manager: Option<NodeManager>,
    prefer_brew: Option<bool>,
    timeout_ms: Option<u64>,
    tools_dir: Option<PathBuf>,
}

impl InstallConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load defaults, then the given TOML file (if it exists), then the
    /// environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("SKILLKIT_CONFIG").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        if path.exists() {
            let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;
            config = config.merge_toml(&text, &path)?;
            tracing::debug!(path = %path.display(), "loaded installer config");
        }

        config.apply_env(|key| std::env::var(key).ok())
    }

    /// Apply a TOML document on top of this config.
    pub fn merge_toml(mut self, text: &str, path: &Path) -> Result<Self, ConfigError> {
        let raw: RawConfigFile = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        let section = raw.install;
        if let Some(manager) = section.node_manager {
            self.preferences.node_manager = manager;
        }
        if let Some(prefer) = section.prefer_brew {
            self.preferences.prefer_brew = prefer;
        }
        if let Some(ms) = section.timeout_ms {
            self.timeout_ms = ms;
        }
        if let Some(dir) = section.tools_dir {
            self.tools_dir = dir;
        }
        Ok(self)
    }

    /// Apply `SKILLKIT_*` overrides read through `lookup`.
    pub fn apply_env<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("SKILLKIT_NODE_MANAGER") {
            self.preferences.node_manager = v.parse()?;
        }
        if let Some(v) = lookup("SKILLKIT_PREFER_BREW") {
            self.preferences.prefer_brew = parse_bool(&v).ok_or(ConfigError::InvalidValue {
                key: "SKILLKIT_PREFER_BREW",
                value: v.clone(),
            })?;
        }
        if let Some(v) = lookup("SKILLKIT_TIMEOUT_MS") {
            self.timeout_ms = v.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "SKILLKIT_TIMEOUT_MS",
                value: v.clone(),
            })?;
        }
        if let Some(v) = lookup("SKILLKIT_TOOLS_DIR") {
            self.tools_dir = PathBuf::from(v);
        }
        Ok(self)
    }

    /// Set the node manager.
    pub fn with_node_manager(mut self, manager: NodeManager) -> Self {
        self.preferences.node_manager = manager;
        self
    }

    /// Enable or disable the Homebrew preference.
    pub fn with_prefer_brew(mut self, prefer: bool) -> Self {
        self.preferences.prefer_brew = prefer;
        self
    }

    /// Set the default timeout (in milliseconds).
    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = ms;
        self
    }

    /// Set the tools directory.
    pub fn with_tools_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tools_dir = dir.into();
        self
    }

    /// The effective, clamped timeout.
    pub fn timeout(&self) -> Duration {
        clamp_timeout(Some(self.timeout_ms))
    }
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// `~/.skillkit/tools`, or `./.skillkit/tools` when no home directory is known.
pub fn default_tools_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".skillkit")
        .join("tools")
}
