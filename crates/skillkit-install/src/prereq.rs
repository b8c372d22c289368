//! Prerequisite resolution.
//!
//! Before an install command runs, every binary the skill and the chosen
//! strategy require must be on PATH.  Missing binaries are installed through
//! a fixed fallback chain, but only if they appear in [`ALLOW_LIST`]: the
//! table maps a binary name to the literal package name each installer
//! family uses for it.  A binary that is not listed is never installed
//! automatically, and no subprocess is started on its behalf.
//!
//! Attempt order for a missing binary (first success wins):
//!
//! 1. Homebrew, when preferred and `brew` is on PATH.
//! 2. The OS package manager, on Linux, when running as root.
//! 3. A global node install through the preferred node manager.
//! 4. `go install`.

use std::path::Path;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::PrereqError;
use crate::format::format_install_failure_message;
use crate::host::HostEnv;
use crate::runner::{CommandRunner, RunOptions};
use crate::strategy::node_install_command;
use crate::types::{InstallPreferences, NodeManager, PrereqInstallAttempt};

/// How one allow-listed binary can be obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinRemedy {
    /// Executable name as looked up on PATH.
    pub bin: &'static str,
    /// Package name for the Linux package manager.
    pub os_package: Option<&'static str>,
    /// Homebrew formula.
    pub brew: Option<&'static str>,
    /// Global node package.
    pub node: Option<&'static str>,
    /// `go install` module path.
    pub go: Option<&'static str>,
}

const fn remedy(bin: &'static str) -> BinRemedy {
    BinRemedy {
        bin,
        os_package: None,
        brew: None,
        node: None,
        go: None,
    }
}

impl BinRemedy {
    const fn os(mut self, package: &'static str) -> Self {
        self.os_package = Some(package);
        self
    }

    const fn brew(mut self, formula: &'static str) -> Self {
        self.brew = Some(formula);
        self
    }

    const fn node(mut self, package: &'static str) -> Self {
        self.node = Some(package);
        self
    }

    const fn go(mut self, module: &'static str) -> Self {
        self.go = Some(module);
        self
    }
}

/// Binaries that may be installed automatically.  Closed: extending it is a
/// code change.
pub static ALLOW_LIST: &[BinRemedy] = &[
    remedy("git").os("git").brew("git"),
    remedy("curl").os("curl").brew("curl"),
    remedy("jq").os("jq").brew("jq"),
    remedy("rg").os("ripgrep").brew("ripgrep"),
    remedy("ffmpeg").os("ffmpeg").brew("ffmpeg"),
    remedy("tmux").os("tmux").brew("tmux"),
    remedy("sqlite3").os("sqlite3").brew("sqlite"),
    remedy("python3").os("python3").brew("python"),
    remedy("node").os("nodejs").brew("node"),
    remedy("npm").os("npm").brew("node"),
    remedy("go").os("golang").brew("go"),
    remedy("uv").brew("uv"),
    remedy("gh").os("gh").brew("gh"),
    remedy("yt-dlp").brew("yt-dlp"),
    remedy("pnpm").brew("pnpm").node("pnpm"),
    remedy("yarn").brew("yarn").node("yarn"),
    remedy("bun").brew("oven-sh/bun/bun").node("bun"),
    remedy("tsx").node("tsx"),
    remedy("clawhub").node("clawhub"),
    remedy("glow")
        .brew("glow")
        .go("github.com/charmbracelet/glow@latest"),
    remedy("gum").brew("gum").go("github.com/charmbracelet/gum@latest"),
    remedy("lazygit")
        .brew("lazygit")
        .go("github.com/jesseduffield/lazygit@latest"),
];

/// Look up the remedy for `bin`, if it is allow-listed.
pub fn lookup_remedy(bin: &str) -> Option<&'static BinRemedy> {
    ALLOW_LIST.iter().find(|r| r.bin == bin)
}

/// Linux package managers, in detection order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsPackageManager {
    AptGet,
    Dnf,
    Pacman,
    Apk,
}

impl OsPackageManager {
    const ALL: [Self; 4] = [Self::AptGet, Self::Dnf, Self::Pacman, Self::Apk];

    pub fn command(&self) -> &'static str {
        match self {
            Self::AptGet => "apt-get",
            Self::Dnf => "dnf",
            Self::Pacman => "pacman",
            Self::Apk => "apk",
        }
    }

    /// The first manager present on the host.
    pub fn detect(host: &dyn HostEnv) -> Option<Self> {
        Self::ALL.into_iter().find(|m| host.has_binary(m.command()))
    }

    /// Non-interactive install argv.
    pub fn install_command(&self, package: &str) -> Vec<String> {
        let parts: &[&str] = match self {
            Self::AptGet => &["apt-get", "install", "-y", package],
            Self::Dnf => &["dnf", "install", "-y", package],
            Self::Pacman => &["pacman", "-S", "--noconfirm", "--needed", package],
            Self::Apk => &["apk", "add", "--no-cache", package],
        };
        parts.iter().map(|s| (*s).to_owned()).collect()
    }
}

/// One step of the fallback chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Installer family, for messages (`brew`, `apt-get`, `npm`, `go`).
    pub installer: String,
    pub argv: Vec<String>,
    pub env: Vec<(String, String)>,
}

/// Successful resolution: the attempts that were made (possibly none).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrereqReport {
    pub attempts: Vec<PrereqInstallAttempt>,
}

impl PrereqReport {
    /// Stdout of every attempt, in order.
    pub fn stdout(&self) -> String {
        join_nonempty(self.attempts.iter().map(|a| a.stdout.as_str()))
    }

    /// Stderr of every attempt, in order.
    pub fn stderr(&self) -> String {
        join_nonempty(self.attempts.iter().map(|a| a.stderr.as_str()))
    }
}

/// Failed resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrereqFailure {
    pub error: PrereqError,
    pub attempts: Vec<PrereqInstallAttempt>,
}

impl PrereqFailure {
    fn new(error: PrereqError, attempts: Vec<PrereqInstallAttempt>) -> Self {
        Self { error, attempts }
    }

    /// The attempt whose output explains the failure.
    pub fn last_attempt(&self) -> Option<&PrereqInstallAttempt> {
        self.attempts.last()
    }

    /// Stdout of every attempt, in order.
    pub fn stdout(&self) -> String {
        join_nonempty(self.attempts.iter().map(|a| a.stdout.as_str()))
    }

    /// Stderr of every attempt, in order.
    pub fn stderr(&self) -> String {
        join_nonempty(self.attempts.iter().map(|a| a.stderr.as_str()))
    }
}

/// Ensures required binaries exist, installing allow-listed ones.
pub struct PrereqResolver<'a> {
    host: &'a dyn HostEnv,
    runner: &'a dyn CommandRunner,
    prefs: InstallPreferences,
    timeout: Duration,
}

impl<'a> PrereqResolver<'a> {
    pub fn new(
        host: &'a dyn HostEnv,
        runner: &'a dyn CommandRunner,
        prefs: InstallPreferences,
        timeout: Duration,
    ) -> Self {
        Self {
            host,
            runner,
            prefs,
            timeout,
        }
    }

    /// Make every binary in `required` discoverable, and at least one of
    /// `any_bins` (when non-empty).
    pub async fn ensure(
        &self,
        required: &[String],
        any_bins: &[String],
    ) -> Result<PrereqReport, PrereqFailure> {
        if !any_bins.is_empty() && !any_bins.iter().any(|b| self.host.has_binary(b)) {
            return Err(PrereqFailure::new(
                PrereqError::AnyOfMissing {
                    bins: any_bins.to_vec(),
                },
                Vec::new(),
            ));
        }

        let missing: Vec<&String> = required
            .iter()
            .filter(|b| !self.host.has_binary(b))
            .collect();
        if missing.is_empty() {
            return Ok(PrereqReport::default());
        }

        // Reject the whole request before touching the system if any missing
        // binary is unlisted.
        let mut plan = Vec::with_capacity(missing.len());
        for bin in &missing {
            match lookup_remedy(bin) {
                Some(remedy) => plan.push(remedy),
                None => {
                    warn!(bin = %bin, "missing binary is not allow-listed");
                    return Err(PrereqFailure::new(
                        PrereqError::NoAllowListedInstaller {
                            bin: (*bin).clone(),
                        },
                        Vec::new(),
                    ));
                }
            }
        }

        let mut attempts = Vec::new();
        for remedy in plan {
            let candidates = self.candidates(remedy);
            if candidates.is_empty() {
                return Err(PrereqFailure::new(
                    PrereqError::NoInstallerAvailable {
                        bin: remedy.bin.to_owned(),
                    },
                    attempts,
                ));
            }

            let mut installed = false;
            for candidate in candidates {
                let attempt = self.attempt(remedy.bin, &candidate).await;
                installed = attempt.ok;
                attempts.push(attempt);
                if installed {
                    break;
                }
            }

            if !installed {
                let message = attempts
                    .last()
                    .map(|a| a.message.clone())
                    .unwrap_or_default();
                return Err(PrereqFailure::new(
                    PrereqError::InstallFailed {
                        bin: remedy.bin.to_owned(),
                        message,
                    },
                    attempts,
                ));
            }
        }

        let still_missing: Vec<String> = required
            .iter()
            .filter(|b| !self.host.has_binary(b))
            .cloned()
            .collect();
        if !still_missing.is_empty() {
            warn!(bins = ?still_missing, "installers reported success but binaries are missing");
            return Err(PrereqFailure::new(
                PrereqError::StillMissing {
                    bins: still_missing,
                },
                attempts,
            ));
        }

        Ok(PrereqReport { attempts })
    }

    /// The fallback chain for one binary on this host.
    pub fn candidates(&self, remedy: &BinRemedy) -> Vec<Candidate> {
        let mut out = Vec::new();

        if self.prefs.prefer_brew
            && let Some(formula) = remedy.brew
            && let Some(brew) = self.host.which("brew")
        {
            out.push(Candidate {
                installer: "brew".into(),
                argv: vec![path_arg(&brew), "install".into(), formula.into()],
                env: vec![("HOMEBREW_NO_AUTO_UPDATE".into(), "1".into())],
            });
        }

        if let Some(package) = remedy.os_package
            && self.host.platform().is_linux()
            && self.host.is_superuser()
            && let Some(manager) = OsPackageManager::detect(self.host)
        {
            let env = match manager {
                OsPackageManager::AptGet => {
                    vec![("DEBIAN_FRONTEND".into(), "noninteractive".into())]
                }
                _ => Vec::new(),
            };
            out.push(Candidate {
                installer: manager.command().into(),
                argv: manager.install_command(package),
                env,
            });
        }

        if let Some(package) = remedy.node
            && let Some(manager) = self.node_manager()
        {
            out.push(Candidate {
                installer: manager.command().into(),
                argv: node_install_command(manager, package),
                env: Vec::new(),
            });
        }

        if let Some(module) = remedy.go
            && self.host.has_binary("go")
        {
            out.push(Candidate {
                installer: "go".into(),
                argv: vec!["go".into(), "install".into(), module.into()],
                env: Vec::new(),
            });
        }

        out
    }

    /// The preferred node manager if present, else npm if present.
    fn node_manager(&self) -> Option<NodeManager> {
        let preferred = self.prefs.node_manager;
        if self.host.has_binary(preferred.command()) {
            Some(preferred)
        } else if self.host.has_binary(NodeManager::Npm.command()) {
            Some(NodeManager::Npm)
        } else {
            None
        }
    }

    async fn attempt(&self, bin: &str, candidate: &Candidate) -> PrereqInstallAttempt {
        info!(bin = %bin, installer = %candidate.installer, "installing missing binary");
        debug!(argv = ?candidate.argv, "prerequisite install command");

        let mut options = RunOptions::new(self.timeout);
        for (key, value) in &candidate.env {
            options = options.with_env(key.clone(), value.clone());
        }
        let output = self.runner.run(&candidate.argv, options).await;

        let ok = output.success();
        let message = if ok {
            format!("Installed {bin} via {}", candidate.installer)
        } else {
            let detail = format_install_failure_message(
                output.code,
                &output.stdout,
                &output.stderr,
                &self.host.platform(),
            );
            warn!(bin = %bin, installer = %candidate.installer, detail = %detail, "prerequisite install failed");
            format!("{} {detail}", candidate.installer)
        };

        PrereqInstallAttempt {
            bin: bin.to_owned(),
            ok,
            message,
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.code,
        }
    }
}

/// Union of manifest-level and spec-level required binaries, first
/// occurrence order, no duplicates or blanks.
pub fn required_bins(manifest: &[String], spec: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for bin in manifest.iter().chain(spec) {
        let bin = bin.trim();
        if !bin.is_empty() && !out.iter().any(|b| b == bin) {
            out.push(bin.to_owned());
        }
    }
    out
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

pub(crate) fn join_nonempty<'s>(parts: impl Iterator<Item = &'s str>) -> String {
    parts
        .map(|s| s.trim_end())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
