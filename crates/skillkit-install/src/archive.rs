//! `download` installs: fetch an artifact, optionally unpack it.
//!
//! The artifact is streamed to `<target_dir>/<file name>`.  Extraction is
//! opt-in per spec (and on by default when the archive type is known) and is
//! delegated to the system `tar` / `unzip` tools under the install timeout.
//! A download that succeeds is reported as a success even when there is
//! nothing to extract.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::{ExtractionError, InstallError};
use crate::fetch::Fetcher;
use crate::format::format_install_failure_message;
use crate::host::HostEnv;
use crate::runner::{CommandOutput, CommandRunner, RunOptions};
use crate::types::{ArchiveType, InstallKind, InstallResult, InstallSpec, SkillEntry};

/// Infer the archive type: an explicit override wins, otherwise the file
/// name suffix decides.
pub fn detect_archive_type(explicit: Option<ArchiveType>, file_name: &str) -> Option<ArchiveType> {
    if explicit.is_some() {
        return explicit;
    }
    let lower = file_name.to_ascii_lowercase();
    if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
        Some(ArchiveType::TarGz)
    } else if lower.ends_with(".tar.bz2") || lower.ends_with(".tbz2") {
        Some(ArchiveType::TarBz2)
    } else if lower.ends_with(".zip") {
        Some(ArchiveType::Zip)
    } else {
        None
    }
}

/// Last non-empty path segment of `url`, or `download`.
pub fn file_name_from_url(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|segments| segments.filter(|s| !s.is_empty()).next_back())
                .map(str::to_owned)
        })
        .filter(|name| name != "." && name != "..")
        .unwrap_or_else(|| "download".to_owned())
}

/// Fetch `url` and stream the body into `dest`.  Returns bytes written.
///
/// A partially written file is removed on failure.  An existing `dest` is
/// left alone unless the download got as far as replacing it.
pub async fn download_to_file(
    fetcher: &dyn Fetcher,
    url: &str,
    dest: &Path,
    timeout: Duration,
) -> Result<u64, InstallError> {
    let mut created = false;
    let result = tokio::time::timeout(
        timeout,
        stream_to_file(fetcher, url, dest, timeout, &mut created),
    )
    .await
    .unwrap_or_else(|_| {
        Err(InstallError::Network(format!(
            "timed out after {} ms",
            timeout.as_millis()
        )))
    });

    if result.is_err() && created {
        let _ = tokio::fs::remove_file(dest).await;
    }
    result
}

async fn stream_to_file(
    fetcher: &dyn Fetcher,
    url: &str,
    dest: &Path,
    timeout: Duration,
    created: &mut bool,
) -> Result<u64, InstallError> {
    let response = fetcher
        .fetch(url, timeout)
        .await
        .map_err(|e| InstallError::Network(e.to_string()))?;

    if !response.is_success() {
        return Err(InstallError::Network(format!("HTTP {}", response.status_text)));
    }
    let Some(mut body) = response.body else {
        return Err(InstallError::Network(format!(
            "HTTP {} returned no body",
            response.status_text
        )));
    };

    let io_err = |e: std::io::Error| {
        InstallError::Network(format!("failed to write {}: {e}", dest.display()))
    };

    let mut file = tokio::fs::File::create(dest).await.map_err(io_err)?;
    *created = true;
    let mut written: u64 = 0;
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| InstallError::Network(e.to_string()))?;
        file.write_all(&chunk).await.map_err(io_err)?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(io_err)?;

    debug!(url = %url, dest = %dest.display(), bytes = written, "download complete");
    Ok(written)
}

/// A failed extraction together with whatever the tool printed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractFailure {
    pub error: ExtractionError,
    pub output: CommandOutput,
}

/// Unpack `archive` into `target_dir`.
///
/// `strip_components` is floored at zero and only applies to tar archives.
pub async fn extract_archive(
    runner: &dyn CommandRunner,
    host: &dyn HostEnv,
    archive: &Path,
    archive_type: ArchiveType,
    target_dir: &Path,
    strip_components: Option<i64>,
    timeout: Duration,
) -> Result<CommandOutput, ExtractFailure> {
    let tool = match archive_type {
        ArchiveType::Zip => "unzip",
        ArchiveType::TarGz | ArchiveType::TarBz2 => "tar",
    };
    if !host.has_binary(tool) {
        return Err(ExtractFailure {
            error: ExtractionError::ToolNotFound { tool },
            output: CommandOutput::default(),
        });
    }

    let archive_arg = archive.to_string_lossy().into_owned();
    let target_arg = target_dir.to_string_lossy().into_owned();
    let argv: Vec<String> = match archive_type {
        ArchiveType::Zip => vec![
            "unzip".into(),
            "-q".into(),
            "-o".into(),
            archive_arg,
            "-d".into(),
            target_arg,
        ],
        ArchiveType::TarGz | ArchiveType::TarBz2 => {
            let flags = if archive_type == ArchiveType::TarGz {
                "xzf"
            } else {
                "xjf"
            };
            let mut argv = vec![
                "tar".into(),
                flags.into(),
                archive_arg,
                "-C".into(),
                target_arg,
            ];
            if let Some(n) = strip_components {
                argv.push("--strip-components".into());
                argv.push(n.max(0).to_string());
            }
            argv
        }
    };

    let output = runner.run(&argv, RunOptions::new(timeout)).await;
    if output.success() {
        Ok(output)
    } else {
        warn!(tool, code = ?output.code, "archive extraction failed");
        Err(ExtractFailure {
            error: ExtractionError::Failed {
                tool,
                code: output.code,
            },
            output,
        })
    }
}

/// Everything a download install needs from the orchestrator.
pub struct DownloadContext<'a> {
    pub fetcher: &'a dyn Fetcher,
    pub runner: &'a dyn CommandRunner,
    pub host: &'a dyn HostEnv,
    pub timeout: Duration,
    pub tools_dir: &'a Path,
}

/// Run a `download` install spec end to end.
pub async fn install_download(
    ctx: &DownloadContext<'_>,
    entry: &SkillEntry,
    spec: &InstallSpec,
) -> InstallResult {
    let InstallKind::Download {
        url,
        archive,
        extract,
        strip_components,
        target_dir,
    } = &spec.kind
    else {
        return InstallResult::failure("not a download install spec");
    };

    let Some(url) = url.as_deref().map(str::trim).filter(|u| !u.is_empty()) else {
        return InstallError::MalformedSpec {
            kind: "download",
            field: "url",
        }
        .into();
    };

    let target_dir = resolve_target_dir(target_dir.as_deref(), ctx.tools_dir, &entry.name);
    if let Err(e) = tokio::fs::create_dir_all(&target_dir).await {
        return InstallResult::failure(format!(
            "failed to create {}: {e}",
            target_dir.display()
        ));
    }

    let file_name = file_name_from_url(url);
    let archive_path = target_dir.join(&file_name);
    info!(skill = %entry.name, url = %url, dest = %archive_path.display(), "downloading");

    let bytes = match download_to_file(ctx.fetcher, url, &archive_path, ctx.timeout).await {
        Ok(bytes) => bytes,
        Err(e) => return e.into(),
    };

    let archive_type = detect_archive_type(*archive, &file_name);
    let should_extract = extract.unwrap_or(archive_type.is_some());
    let Some(archive_type) = archive_type.filter(|_| should_extract) else {
        return InstallResult::success(format!(
            "Downloaded {file_name} ({bytes} bytes) to {}",
            archive_path.display()
        ));
    };

    match extract_archive(
        ctx.runner,
        ctx.host,
        &archive_path,
        archive_type,
        &target_dir,
        *strip_components,
        ctx.timeout,
    )
    .await
    {
        Ok(output) => InstallResult::success(format!(
            "Downloaded and extracted {file_name} ({bytes} bytes) to {}",
            target_dir.display()
        ))
        .with_output(output.stdout, output.stderr),
        Err(ExtractFailure { error, output }) => {
            let summary = matches!(error, ExtractionError::Failed { .. }).then(|| {
                format_install_failure_message(
                    output.code,
                    &output.stdout,
                    &output.stderr,
                    &ctx.host.platform(),
                )
            });
            let mut result = InstallResult::from(InstallError::Extraction(error));
            if let Some(summary) = summary {
                result.message = format!("{}: {summary}", result.message);
            }
            result
                .with_output(output.stdout, output.stderr)
                .with_code(output.code)
        }
    }
}

/// Explicit target (with `~` expansion; relative paths live under
/// `tools_dir`), or `<tools_dir>/<skill>`.
fn resolve_target_dir(explicit: Option<&Path>, tools_dir: &Path, skill: &str) -> PathBuf {
    match explicit {
        Some(dir) => {
            if let Ok(rest) = dir.strip_prefix("~")
                && let Some(home) = dirs::home_dir()
            {
                return home.join(rest);
            }
            if dir.is_absolute() {
                dir.to_path_buf()
            } else {
                tools_dir.join(dir)
            }
        }
        None => tools_dir.join(skill),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_type_from_suffix() {
        assert_eq!(detect_archive_type(None, "tool.tar.gz"), Some(ArchiveType::TarGz));
        assert_eq!(detect_archive_type(None, "tool.TGZ"), Some(ArchiveType::TarGz));
        assert_eq!(detect_archive_type(None, "tool.tar.bz2"), Some(ArchiveType::TarBz2));
        assert_eq!(detect_archive_type(None, "tool.tbz2"), Some(ArchiveType::TarBz2));
        assert_eq!(detect_archive_type(None, "tool.zip"), Some(ArchiveType::Zip));
        assert_eq!(detect_archive_type(None, "tool.tar.xz"), None);
        assert_eq!(detect_archive_type(None, "tool"), None);
    }

    #[test]
    fn explicit_archive_type_wins() {
        assert_eq!(
            detect_archive_type(Some(ArchiveType::Zip), "tool.tar.gz"),
            Some(ArchiveType::Zip)
        );
        assert_eq!(
            detect_archive_type(Some(ArchiveType::TarBz2), "latest"),
            Some(ArchiveType::TarBz2)
        );
    }

    #[test]
    fn file_name_is_last_url_segment() {
        assert_eq!(
            file_name_from_url("https://example.com/releases/v1/tool-linux.tar.gz?sig=1"),
            "tool-linux.tar.gz"
        );
        assert_eq!(file_name_from_url("https://example.com/dir/"), "dir");
        assert_eq!(file_name_from_url("https://example.com"), "download");
        assert_eq!(file_name_from_url("::::"), "download");
    }

    #[test]
    fn target_dir_resolution() {
        let tools = Path::new("/opt/tools");
        assert_eq!(
            resolve_target_dir(None, tools, "demo"),
            PathBuf::from("/opt/tools/demo")
        );
        assert_eq!(
            resolve_target_dir(Some(Path::new("custom")), tools, "demo"),
            PathBuf::from("/opt/tools/custom")
        );
        assert_eq!(
            resolve_target_dir(Some(Path::new("/srv/bin")), tools, "demo"),
            PathBuf::from("/srv/bin")
        );
    }
}
