//! Bounded process runner.
//!
//! Installers are spawned directly from an argv vector (never through a
//! shell) with piped output and a hard wall-clock limit.  A spawn failure or
//! a timeout is reported as `code: None` with the reason in `stderr`; the
//! runner itself never errors.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

/// Maximum output size in bytes (1 MiB).  Stdout and stderr are each
/// independently truncated to this limit.
const MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// Options for a single run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Hard wall-clock limit.
    pub timeout: Duration,
    /// Extra environment variables.
    pub env: Vec<(String, String)>,
}

impl RunOptions {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            env: Vec::new(),
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// Captured output of a finished (or failed-to-start) process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code; `None` on spawn failure, timeout or signal.
    pub code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// An output describing a process that never produced an exit code.
    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            code: None,
        }
    }
}

/// Runs external commands under a timeout.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, argv: &[String], options: RunOptions) -> CommandOutput;
}

/// [`CommandRunner`] backed by `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, argv: &[String], options: RunOptions) -> CommandOutput {
        let Some((program, args)) = argv.split_first() else {
            return CommandOutput::failed("empty command");
        };

        debug!(
            argv = ?argv,
            timeout_ms = options.timeout.as_millis() as u64,
            "running command"
        );

        let mut cmd = tokio::process::Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &options.env {
            cmd.env(key, value);
        }

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(program = %program, error = %e, "failed to spawn command");
                return CommandOutput::failed(format!("failed to spawn `{program}`: {e}"));
            }
        };

        // `wait_with_output` takes ownership, so on timeout the child is
        // dropped and killed via `kill_on_drop(true)`.
        match tokio::time::timeout(options.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let code = output.status.code();
                debug!(program = %program, code = ?code, "command finished");
                CommandOutput {
                    stdout: truncate_output(&output.stdout),
                    stderr: truncate_output(&output.stderr),
                    code,
                }
            }
            Ok(Err(e)) => CommandOutput::failed(format!("process error: {e}")),
            Err(_) => {
                let ms = options.timeout.as_millis();
                warn!(program = %program, timeout_ms = ms as u64, "command timed out");
                CommandOutput::failed(format!("`{program}` timed out after {ms} ms"))
            }
        }
    }
}

/// Truncate raw command output to [`MAX_OUTPUT_BYTES`], converting to a
/// lossy UTF-8 string.
fn truncate_output(raw: &[u8]) -> String {
    if raw.len() <= MAX_OUTPUT_BYTES {
        String::from_utf8_lossy(raw).into_owned()
    } else {
        let mut s = String::from_utf8_lossy(&raw[..MAX_OUTPUT_BYTES]).into_owned();
        s.push_str("\n... [output truncated at 1 MiB]");
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn truncate_output_short_input_not_truncated() {
        assert_eq!(truncate_output(b"hello world"), "hello world");
    }

    #[test]
    fn truncate_output_large_input_is_truncated() {
        let data = vec![b'x'; MAX_OUTPUT_BYTES + 1000];
        let s = truncate_output(&data);
        assert!(s.contains("[output truncated at 1 MiB]"));
        assert!(s.len() <= MAX_OUTPUT_BYTES + 50);
    }

    #[tokio::test]
    async fn empty_argv_fails_without_spawning() {
        let out = ProcessRunner
            .run(&[], RunOptions::new(Duration::from_secs(1)))
            .await;
        assert_eq!(out.code, None);
        assert_eq!(out.stderr, "empty command");
    }

    #[tokio::test]
    async fn missing_program_reports_spawn_failure() {
        let out = ProcessRunner
            .run(
                &argv(&["nonexistent_binary_xyz_123"]),
                RunOptions::new(Duration::from_secs(1)),
            )
            .await;
        assert_eq!(out.code, None);
        assert!(out.stderr.contains("failed to spawn"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_output_and_exit_code() {
        let out = ProcessRunner
            .run(
                &argv(&["sh", "-c", "echo out; echo err >&2; exit 3"]),
                RunOptions::new(Duration::from_secs(5)),
            )
            .await;
        assert_eq!(out.code, Some(3));
        assert_eq!(out.stdout.trim(), "out");
        assert_eq!(out.stderr.trim(), "err");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn passes_extra_env() {
        let out = ProcessRunner
            .run(
                &argv(&["sh", "-c", "printf %s \"$SKILLKIT_TEST\""]),
                RunOptions::new(Duration::from_secs(5)).with_env("SKILLKIT_TEST", "yes"),
            )
            .await;
        assert!(out.success());
        assert_eq!(out.stdout, "yes");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timeout_yields_failure_not_hang() {
        let out = ProcessRunner
            .run(
                &argv(&["sleep", "5"]),
                RunOptions::new(Duration::from_millis(100)),
            )
            .await;
        assert_eq!(out.code, None);
        assert!(out.stderr.contains("timed out"));
    }
}
