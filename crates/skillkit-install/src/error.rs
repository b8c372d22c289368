//! Error types for the skill installer.
//!
//! [`InstallError`] is the terminal-failure taxonomy of an install call.  It
//! never escapes [`crate::SkillInstaller::install`]; the orchestrator turns
//! every variant into an [`crate::InstallResult`] with `ok = false`.

use std::path::PathBuf;

/// Terminal install failures.
#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    #[error("{0}")]
    NotFound(String),

    #[error("{kind} install spec is missing `{field}`")]
    MalformedSpec { kind: &'static str, field: &'static str },

    #[error("download installs are handled elsewhere")]
    DownloadHandledElsewhere,

    #[error(transparent)]
    MissingPrerequisite(#[from] PrereqError),

    #[error("{tool} is not installed: {remediation}")]
    ToolMissing { tool: String, remediation: String },

    /// Installer command failed; carries the summarized failure line.
    #[error("{0}")]
    Subprocess(String),

    #[error("download failed: {0}")]
    Network(String),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("failed to load skills: {0}")]
    Manifest(#[from] SkillError),
}

/// Reasons prerequisite resolution can fail.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PrereqError {
    #[error("missing `{bin}` and no allow-listed installer exists for it")]
    NoAllowListedInstaller { bin: String },

    #[error("missing `{bin}` and no supported installer is available on this host")]
    NoInstallerAvailable { bin: String },

    #[error("need one of [{}]", .bins.join(", "))]
    AnyOfMissing { bins: Vec<String> },

    #[error("failed to install `{bin}`: {message}")]
    InstallFailed { bin: String, message: String },

    #[error("still missing after install: {}", .bins.join(", "))]
    StillMissing { bins: Vec<String> },
}

/// Archive extraction failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionError {
    #[error("{tool} not found on PATH; cannot extract archive")]
    ToolNotFound { tool: &'static str },

    #[error("{tool} extraction failed ({})", exit_label(.code))]
    Failed {
        tool: &'static str,
        code: Option<i32>,
    },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("exit {c}"),
        None => "unknown exit".into(),
    }
}

/// Manifest loading errors.
#[derive(Debug, thiserror::Error)]
pub enum SkillError {
    #[error("invalid SKILL.md format in `{path}`: {reason}")]
    InvalidFormat { path: PathBuf, reason: String },

    #[error("missing required field `{field}` in SKILL.md at `{path}`")]
    MissingField { path: PathBuf, field: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Guarded fetch errors.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("invalid URL `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("blocked: {0}")]
    Blocked(String),

    #[error("too many redirects (max {0})")]
    TooManyRedirects(usize),

    #[error("request timed out after {0} ms")]
    Timeout(u64),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP client unavailable: {0}")]
    ClientUnavailable(String),
}

/// Security scanner errors.  Always downgraded to a warning.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ScanError(pub String);

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config `{path}`: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config `{path}`: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("unknown node manager `{0}` (expected npm, pnpm, yarn or bun)")]
    UnknownNodeManager(String),

    #[error("invalid value `{value}` for {key}")]
    InvalidValue { key: &'static str, value: String },
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, InstallError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_of_message_lists_candidates() {
        let err = PrereqError::AnyOfMissing {
            bins: vec!["claude".into(), "codex".into()],
        };
        assert_eq!(err.to_string(), "need one of [claude, codex]");
    }

    #[test]
    fn extraction_messages_distinguish_tool_and_exit() {
        let missing = ExtractionError::ToolNotFound { tool: "unzip" };
        assert!(missing.to_string().contains("unzip not found"));

        let failed = ExtractionError::Failed {
            tool: "tar",
            code: Some(2),
        };
        assert_eq!(failed.to_string(), "tar extraction failed (exit 2)");

        let killed = ExtractionError::Failed {
            tool: "tar",
            code: None,
        };
        assert!(killed.to_string().contains("unknown exit"));
    }

    #[test]
    fn subprocess_and_extraction_failures_keep_their_text() {
        let subprocess = InstallError::Subprocess("Install failed (exit 1): Error: boom".into());
        assert_eq!(subprocess.to_string(), "Install failed (exit 1): Error: boom");

        let extraction: InstallError = ExtractionError::ToolNotFound { tool: "tar" }.into();
        assert!(matches!(extraction, InstallError::Extraction(_)));
        assert_eq!(extraction.to_string(), "tar not found on PATH; cannot extract archive");
    }
}
