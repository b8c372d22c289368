//! The install orchestrator.
//!
//! [`SkillInstaller::install`] drives one install end to end:
//!
//! 1. load the skill from the workspace,
//! 2. scan it (advisory, never blocks),
//! 3. pick the install spec by id,
//! 4. hand `download` specs to [`crate::archive`],
//! 5. otherwise build the package-manager command,
//! 6. make sure every prerequisite binary is present,
//! 7. run the command under the clamped timeout,
//! 8. merge and format the output.
//!
//! Every failure is reported through [`InstallResult`]; `install` never
//! returns an error.  The installer keeps no mutable state, so one instance
//! can serve concurrent calls.

use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tracing::{debug, info, warn};

use crate::archive::{DownloadContext, install_download};
use crate::config::{clamp_timeout, default_tools_dir};
use crate::error::{InstallError, ScanError};
use crate::fetch::{Fetcher, GuardedFetcher};
use crate::format::format_install_failure_message;
use crate::host::{HostEnv, SystemHost};
use crate::loader::ManifestLoader;
use crate::prereq::{PrereqFailure, PrereqReport, PrereqResolver, join_nonempty, required_bins};
use crate::runner::{CommandOutput, CommandRunner, ProcessRunner, RunOptions};
use crate::scanner::{NoopScanner, SecurityScanner, scan_warnings};
use crate::strategy::{build_install_command, find_install_spec, install_label, resolve_install_id};
use crate::types::{
    InstallKind, InstallOption, InstallPreferences, InstallRequest, InstallResult, InstallSpec,
    SkillEntry,
};

const BREW_REMEDIATION: &str =
    "Install Homebrew (https://brew.sh) or pick a different install option.";
const UV_REMEDIATION: &str =
    "Install uv (https://docs.astral.sh/uv/getting-started/installation/) and retry.";
const GO_REMEDIATION: &str = "Install Go (https://go.dev/doc/install) and retry.";

/// Installs skill dependencies.
pub struct SkillInstaller {
    loader: Arc<dyn ManifestLoader>,
    scanner: Arc<dyn SecurityScanner>,
    fetcher: Arc<dyn Fetcher>,
    runner: Arc<dyn CommandRunner>,
    host: Arc<dyn HostEnv>,
    tools_dir: PathBuf,
}

impl SkillInstaller {
    /// Create an installer with the default system collaborators.
    pub fn new(loader: Arc<dyn ManifestLoader>) -> Self {
        Self {
            loader,
            scanner: Arc::new(NoopScanner),
            fetcher: Arc::new(GuardedFetcher::new()),
            runner: Arc::new(ProcessRunner),
            host: Arc::new(SystemHost),
            tools_dir: default_tools_dir(),
        }
    }

    pub fn with_scanner(mut self, scanner: Arc<dyn SecurityScanner>) -> Self {
        self.scanner = scanner;
        self
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_host(mut self, host: Arc<dyn HostEnv>) -> Self {
        self.host = host;
        self
    }

    /// Root for `download` installs without an explicit `targetDir`.
    pub fn with_tools_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tools_dir = dir.into();
        self
    }

    /// All skills visible from `workspace`.
    pub async fn skills(&self, workspace: &Path) -> Result<Vec<SkillEntry>, InstallError> {
        Ok(self.loader.load_entries(workspace).await?)
    }

    /// The install options a skill declares, with their unmet prerequisites.
    pub async fn list_options(
        &self,
        workspace: &Path,
        skill: &str,
    ) -> Result<Vec<InstallOption>, InstallError> {
        let entry = self.find_entry(workspace, skill).await?;
        Ok(entry
            .install
            .iter()
            .enumerate()
            .map(|(index, spec)| {
                let bins = required_bins(&entry.requires.bins, &spec.bins);
                let missing_bins = bins
                    .iter()
                    .filter(|b| !self.host.has_binary(b))
                    .cloned()
                    .collect();
                InstallOption {
                    id: resolve_install_id(spec, index),
                    kind: spec.kind.name(),
                    label: install_label(spec),
                    bins,
                    missing_bins,
                }
            })
            .collect())
    }

    /// Run one install.  Never fails; see [`InstallResult::ok`].
    pub async fn install(&self, request: InstallRequest) -> InstallResult {
        let timeout = clamp_timeout(request.timeout_ms);
        info!(
            skill = %request.skill_name,
            install_id = %request.install_id,
            timeout_ms = timeout.as_millis() as u64,
            "installing skill"
        );

        let entry = match self
            .find_entry(&request.workspace_dir, &request.skill_name)
            .await
        {
            Ok(entry) => entry,
            Err(e) => {
                warn!(skill = %request.skill_name, error = %e, "skill lookup failed");
                return e.into();
            }
        };

        let warnings = self.scan(&entry).await;

        let Some(spec) = find_install_spec(&entry, &request.install_id) else {
            warn!(skill = %entry.name, install_id = %request.install_id, "install spec not found");
            return InstallResult::from(InstallError::NotFound(format!(
                "Installer not found: {}",
                request.install_id
            )))
            .with_warnings(warnings);
        };

        let result = self
            .run_spec(&entry, spec, request.preferences, timeout)
            .await;

        if result.ok {
            info!(skill = %entry.name, install_id = %request.install_id, "install succeeded");
        } else {
            warn!(
                skill = %entry.name,
                install_id = %request.install_id,
                message = %result.message,
                "install failed"
            );
        }

        let mut merged = warnings;
        merged.extend(result.warnings.iter().cloned());
        InstallResult {
            warnings: merged,
            ..result
        }
    }

    async fn find_entry(&self, workspace: &Path, skill: &str) -> Result<SkillEntry, InstallError> {
        self.loader
            .load_entries(workspace)
            .await?
            .into_iter()
            .find(|e| e.name == skill)
            .ok_or_else(|| InstallError::NotFound(format!("Skill not found: {skill}")))
    }

    /// Scan the skill directory.  Errors and panics both become one warning.
    async fn scan(&self, entry: &SkillEntry) -> Vec<String> {
        let outcome = AssertUnwindSafe(self.scanner.scan(&entry.base_dir))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(ScanError("scanner panicked".into())));

        if let Err(e) = &outcome {
            warn!(skill = %entry.name, error = %e, "security scan failed");
        }
        let warnings = scan_warnings(&entry.name, &outcome);
        for w in &warnings {
            warn!(skill = %entry.name, "{w}");
        }
        warnings
    }

    async fn run_spec(
        &self,
        entry: &SkillEntry,
        spec: &InstallSpec,
        prefs: InstallPreferences,
        timeout: Duration,
    ) -> InstallResult {
        if matches!(spec.kind, InstallKind::Download { .. }) {
            let ctx = DownloadContext {
                fetcher: self.fetcher.as_ref(),
                runner: self.runner.as_ref(),
                host: self.host.as_ref(),
                timeout,
                tools_dir: &self.tools_dir,
            };
            return install_download(&ctx, entry, spec).await;
        }

        let mut argv = match build_install_command(spec, &prefs) {
            Ok(argv) => argv,
            Err(e) => {
                return InstallResult::failure(e.to_string())
                    .with_output(String::new(), debug_payload(entry, spec));
            }
        };

        if matches!(spec.kind, InstallKind::Brew { .. }) {
            match self.host.which("brew") {
                Some(brew) => argv[0] = brew.to_string_lossy().into_owned(),
                None => {
                    return InstallError::ToolMissing {
                        tool: "brew".into(),
                        remediation: BREW_REMEDIATION.into(),
                    }
                    .into();
                }
            }
        }

        let resolver =
            PrereqResolver::new(self.host.as_ref(), self.runner.as_ref(), prefs, timeout);

        let required = required_bins(&entry.requires.bins, &spec.bins);
        let mut prereqs = match resolver.ensure(&required, &entry.requires.any_bins).await {
            Ok(report) => report,
            Err(failure) => {
                let (stdout, stderr) = (failure.stdout(), failure.stderr());
                let code = last_exit_code(&failure);
                return InstallResult::from(InstallError::MissingPrerequisite(failure.error))
                    .with_output(stdout, stderr)
                    .with_code(code);
            }
        };

        if let Some((tool, remediation)) = bootstrap_tool(&spec.kind)
            && !self.host.has_binary(tool)
        {
            info!(tool, "bootstrapping installer tool");
            match resolver.ensure(&[tool.to_owned()], &[]).await {
                Ok(report) => prereqs.attempts.extend(report.attempts),
                Err(failure) => {
                    let stdout = join_nonempty(
                        [prereqs.stdout(), failure.stdout()].iter().map(String::as_str),
                    );
                    let stderr = join_nonempty(
                        [prereqs.stderr(), failure.stderr()].iter().map(String::as_str),
                    );
                    return InstallResult::from(InstallError::ToolMissing {
                        tool: tool.into(),
                        remediation: format!("{remediation} ({})", failure.error),
                    })
                    .with_output(stdout, stderr)
                    .with_code(last_exit_code(&failure));
                }
            }
        }

        debug!(argv = ?argv, "install command");
        let output = self.runner.run(&argv, RunOptions::new(timeout)).await;
        self.command_result(&prereqs, output)
    }

    fn command_result(&self, prereqs: &PrereqReport, output: CommandOutput) -> InstallResult {
        let stdout = join_nonempty([prereqs.stdout().as_str(), output.stdout.as_str()].into_iter());
        let stderr = join_nonempty([prereqs.stderr().as_str(), output.stderr.as_str()].into_iter());

        if output.success() {
            return InstallResult::success("Installed")
                .with_output(stdout, stderr)
                .with_code(output.code);
        }

        let message = format_install_failure_message(
            output.code,
            &output.stdout,
            &output.stderr,
            &self.host.platform(),
        );
        InstallResult::from(InstallError::Subprocess(message))
            .with_output(stdout, stderr)
            .with_code(output.code)
    }
}

/// Installer tools that may be bootstrapped through the prerequisite chain.
fn bootstrap_tool(kind: &InstallKind) -> Option<(&'static str, &'static str)> {
    match kind {
        InstallKind::Uv { .. } => Some(("uv", UV_REMEDIATION)),
        InstallKind::Go { .. } => Some(("go", GO_REMEDIATION)),
        InstallKind::Brew { .. } | InstallKind::Node { .. } | InstallKind::Download { .. } => None,
    }
}

fn last_exit_code(failure: &PrereqFailure) -> Option<i32> {
    failure.last_attempt().and_then(|a| a.exit_code)
}

/// Skill identity plus the offending spec, for diagnosing malformed manifests.
fn debug_payload(entry: &SkillEntry, spec: &InstallSpec) -> String {
    serde_json::json!({
        "skill": {
            "name": entry.name,
            "source": entry.source,
            "filePath": entry.file_path,
            "baseDir": entry.base_dir,
        },
        "spec": spec,
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_only_for_uv_and_go() {
        assert_eq!(
            bootstrap_tool(&InstallKind::Uv { package: None }).map(|t| t.0),
            Some("uv")
        );
        assert_eq!(
            bootstrap_tool(&InstallKind::Go { module: None }).map(|t| t.0),
            Some("go")
        );
        assert!(bootstrap_tool(&InstallKind::Brew { formula: None }).is_none());
        assert!(bootstrap_tool(&InstallKind::Node { package: None }).is_none());
    }

    #[test]
    fn debug_payload_names_skill_and_spec() {
        let entry = SkillEntry {
            name: "demo".into(),
            description: String::new(),
            base_dir: PathBuf::from("/ws/skills/demo"),
            source: "workspace".into(),
            file_path: PathBuf::from("/ws/skills/demo/SKILL.md"),
            requires: Default::default(),
            install: Vec::new(),
        };
        let spec = InstallSpec::new(InstallKind::Node { package: None }).with_id("npm");
        let payload: serde_json::Value =
            serde_json::from_str(&debug_payload(&entry, &spec)).unwrap();
        assert_eq!(payload["skill"]["name"], "demo");
        assert_eq!(payload["skill"]["filePath"], "/ws/skills/demo/SKILL.md");
        assert_eq!(payload["spec"]["kind"], "node");
        assert_eq!(payload["spec"]["id"], "npm");
    }

    #[test]
    fn installer_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SkillInstaller>();
    }
}
