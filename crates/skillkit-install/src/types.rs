//! Skill and install-spec type definitions.
//!
//! A skill is declared by a `SKILL.md` manifest.  Its frontmatter lists the
//! binaries it needs (`requires`) and one or more install strategies
//! (`install`), each of which is an [`InstallSpec`].

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A skill as seen by the installer: identity, requirements and strategies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillEntry {
    /// Unique skill name / slug (e.g. `github`, `summarize`).
    pub name: String,

    /// Short human-readable description.
    #[serde(default)]
    pub description: String,

    /// Directory containing the skill's `SKILL.md`.
    pub base_dir: PathBuf,

    /// Where the skill came from (`workspace`, `bundled`, ...).
    pub source: String,

    /// Path of the manifest file.
    pub file_path: PathBuf,

    /// Runtime requirements.
    #[serde(default)]
    pub requires: SkillRequirements,

    /// Declared install strategies, in manifest order.
    #[serde(default)]
    pub install: Vec<InstallSpec>,
}

/// Runtime requirements declared by a skill.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillRequirements {
    /// Environment variables the skill expects.
    #[serde(default)]
    pub env: Vec<String>,

    /// CLI binaries that must all be installed.
    #[serde(default)]
    pub bins: Vec<String>,

    /// CLI binaries where at least one must exist.
    #[serde(default, rename = "anyBins")]
    pub any_bins: Vec<String>,
}

/// One declared install strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallSpec {
    /// Stable identifier.  Defaults to `<kind>-<index>` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Display label for UIs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Binaries this strategy needs on PATH before it can run.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bins: Vec<String>,

    /// Kind-specific parameters.
    #[serde(flatten)]
    pub kind: InstallKind,
}

/// Kind-specific install parameters.
///
/// Mandatory fields are `Option` so that a malformed manifest still loads and
/// the failure is reported at install time against the specific strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum InstallKind {
    Brew {
        #[serde(default)]
        formula: Option<String>,
    },
    Node {
        #[serde(default)]
        package: Option<String>,
    },
    Go {
        #[serde(default)]
        module: Option<String>,
    },
    Uv {
        #[serde(default)]
        package: Option<String>,
    },
    Download {
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        archive: Option<ArchiveType>,
        #[serde(default)]
        extract: Option<bool>,
        #[serde(default, rename = "stripComponents")]
        strip_components: Option<i64>,
        #[serde(default, rename = "targetDir")]
        target_dir: Option<PathBuf>,
    },
}

impl InstallKind {
    /// The manifest name of this kind.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Brew { .. } => "brew",
            Self::Node { .. } => "node",
            Self::Go { .. } => "go",
            Self::Uv { .. } => "uv",
            Self::Download { .. } => "download",
        }
    }
}

impl InstallSpec {
    /// Build a spec with no id, label or spec-level bins.
    pub fn new(kind: InstallKind) -> Self {
        Self {
            id: None,
            label: None,
            bins: Vec::new(),
            kind,
        }
    }

    /// Set the explicit id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the spec-level required binaries.
    pub fn with_bins<I, S>(mut self, bins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.bins = bins.into_iter().map(Into::into).collect();
        self
    }
}

/// Supported archive formats for `download` installs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArchiveType {
    #[serde(rename = "tar.gz")]
    TarGz,
    #[serde(rename = "tar.bz2")]
    TarBz2,
    #[serde(rename = "zip")]
    Zip,
}

impl fmt::Display for ArchiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::TarGz => "tar.gz",
            Self::TarBz2 => "tar.bz2",
            Self::Zip => "zip",
        })
    }
}

/// Node package managers the installer can drive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeManager {
    #[default]
    Npm,
    Pnpm,
    Yarn,
    Bun,
}

impl NodeManager {
    /// Executable name of the manager.
    pub fn command(&self) -> &'static str {
        match self {
            Self::Npm => "npm",
            Self::Pnpm => "pnpm",
            Self::Yarn => "yarn",
            Self::Bun => "bun",
        }
    }
}

impl fmt::Display for NodeManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.command())
    }
}

impl std::str::FromStr for NodeManager {
    type Err = crate::error::ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "npm" => Ok(Self::Npm),
            "pnpm" => Ok(Self::Pnpm),
            "yarn" => Ok(Self::Yarn),
            "bun" => Ok(Self::Bun),
            other => Err(crate::error::ConfigError::UnknownNodeManager(
                other.to_owned(),
            )),
        }
    }
}

/// Caller preferences that steer strategy and remediation choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallPreferences {
    /// Manager used for `node` installs and node-based remediations.
    pub node_manager: NodeManager,

    /// Try Homebrew first when remediating missing binaries.
    pub prefer_brew: bool,
}

impl Default for InstallPreferences {
    fn default() -> Self {
        Self {
            node_manager: NodeManager::Npm,
            prefer_brew: true,
        }
    }
}

/// One attempted remediation for a missing binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrereqInstallAttempt {
    pub bin: String,
    pub ok: bool,
    pub message: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

/// The single output contract of an install call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallResult {
    pub ok: bool,
    pub message: String,
    pub stdout: String,
    pub stderr: String,
    pub code: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl InstallResult {
    /// A successful result with no captured output.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
            stdout: String::new(),
            stderr: String::new(),
            code: Some(0),
            warnings: Vec::new(),
        }
    }

    /// A failed result carrying the error's message.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
            stdout: String::new(),
            stderr: String::new(),
            code: None,
            warnings: Vec::new(),
        }
    }

    /// Attach captured output.
    pub fn with_output(mut self, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self.stderr = stderr.into();
        self
    }

    /// Set the exit code.
    pub fn with_code(mut self, code: Option<i32>) -> Self {
        self.code = code;
        self
    }

    /// Append warnings.  Never changes `ok`.
    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings.extend(warnings);
        self
    }
}

impl From<crate::error::InstallError> for InstallResult {
    fn from(err: crate::error::InstallError) -> Self {
        Self::failure(err.to_string())
    }
}

/// Request for a single install.
#[derive(Debug, Clone)]
pub struct InstallRequest {
    /// Workspace whose skills are loaded.
    pub workspace_dir: PathBuf,
    /// Skill name.
    pub skill_name: String,
    /// Resolved install id (`brew-0`, or an explicit id).
    pub install_id: String,
    /// Requested timeout; clamped to the allowed window.
    pub timeout_ms: Option<u64>,
    /// Package-manager preferences.
    pub preferences: InstallPreferences,
}

impl InstallRequest {
    pub fn new(
        workspace_dir: impl Into<PathBuf>,
        skill_name: impl Into<String>,
        install_id: impl Into<String>,
    ) -> Self {
        Self {
            workspace_dir: workspace_dir.into(),
            skill_name: skill_name.into(),
            install_id: install_id.into(),
            timeout_ms: None,
            preferences: InstallPreferences::default(),
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_preferences(mut self, preferences: InstallPreferences) -> Self {
        self.preferences = preferences;
        self
    }
}

/// Summary of one install option, for listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallOption {
    pub id: String,
    pub kind: &'static str,
    pub label: String,
    pub bins: Vec<String>,
    /// Required binaries not currently on PATH.
    pub missing_bins: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_spec_deserializes_tagged_kind() {
        let spec: InstallSpec = serde_json::from_str(
            r#"{"id":"brew","kind":"brew","formula":"gh","bins":["gh"],"label":"Install GitHub CLI"}"#,
        )
        .unwrap();
        assert_eq!(spec.id.as_deref(), Some("brew"));
        assert_eq!(spec.bins, vec!["gh"]);
        assert_eq!(
            spec.kind,
            InstallKind::Brew {
                formula: Some("gh".into())
            }
        );
    }

    #[test]
    fn download_spec_reads_camel_case_fields() {
        let spec: InstallSpec = serde_json::from_str(
            r#"{"kind":"download","url":"https://example.com/t.tar.gz","archive":"tar.gz","stripComponents":1,"targetDir":"/opt/t"}"#,
        )
        .unwrap();
        match spec.kind {
            InstallKind::Download {
                archive,
                strip_components,
                target_dir,
                extract,
                ..
            } => {
                assert_eq!(archive, Some(ArchiveType::TarGz));
                assert_eq!(strip_components, Some(1));
                assert_eq!(target_dir, Some(PathBuf::from("/opt/t")));
                assert_eq!(extract, None);
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn missing_mandatory_field_still_deserializes() {
        let spec: InstallSpec = serde_json::from_str(r#"{"kind":"node"}"#).unwrap();
        assert_eq!(spec.kind, InstallKind::Node { package: None });
    }

    #[test]
    fn node_manager_from_str() {
        assert_eq!("PNPM".parse::<NodeManager>().unwrap(), NodeManager::Pnpm);
        assert!("cargo".parse::<NodeManager>().is_err());
    }

    #[test]
    fn install_result_omits_empty_warnings() {
        let json = serde_json::to_value(InstallResult::success("Installed")).unwrap();
        assert!(json.get("warnings").is_none());
        assert_eq!(json["code"], 0);
    }
}
