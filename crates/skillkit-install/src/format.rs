//! Install output summarization.
//!
//! Third-party installers fail in many shapes.  Instead of per-tool parsers
//! the formatter picks the most telling line of output, labels the exit
//! code, and adds a hint when the output says the package targets a
//! different OS or CPU architecture than the host.

use std::sync::LazyLock;

use regex::Regex;

use crate::host::{Platform, normalize_arch, normalize_os};

/// Maximum length of the summary line, in characters.
const MAX_SUMMARY_CHARS: usize = 200;

static ERROR_LEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:npm\s+err!|err!|error\b|fatal\b)").expect("valid regex")
});

static FAILURE_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:error|errors|failed|failure|fatal|not found|no such|denied|cannot|can't|unable|unsupported|invalid)\b",
    )
    .expect("valid regex")
});

static ARCH_REQUIREMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)(?:\b(?:requires?|required|only\s+(?:supports?|supported|available)(?:\s+(?:on|for))?|wanted)\b[^\n]{0,40}?|"(?:arch|cpu)"\s*:\s*\[?\s*")\b(arm64|aarch64|x86_64|x64|amd64|i386|i686)\b|\b(arm64|aarch64|x86_64|x64|amd64|i386|i686)\s+architecture\s+is\s+required\b"#,
    )
    .expect("valid regex")
});

static OS_REQUIREMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)(?:\b(?:requires?|required|only\s+(?:supports?|supported|available)(?:\s+(?:on|for))?|wanted)\b[^\n]{0,40}?|"os"\s*:\s*\[?\s*")\b(macos|darwin|linux|windows|win32)\b|\b(macos|darwin|linux|windows|win32)\s+is\s+required\b"#,
    )
    .expect("valid regex")
});

/// Label an exit code: `exit N` or `unknown exit`.
pub fn exit_label(code: Option<i32>) -> String {
    match code {
        Some(c) => format!("exit {c}"),
        None => "unknown exit".into(),
    }
}

/// Pick one line that best explains `text`.
///
/// Priority: first line that starts like an error, then first line with a
/// failure keyword, then the last non-empty line.
pub fn summarize_install_output(text: &str) -> Option<String> {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let chosen = lines
        .iter()
        .find(|l| ERROR_LEADING.is_match(l))
        .or_else(|| lines.iter().find(|l| FAILURE_KEYWORD.is_match(l)))
        .or_else(|| lines.last())?;

    Some(truncate_summary(&normalize_whitespace(chosen)))
}

/// Look for OS/architecture requirements in `output` that the host violates.
pub fn platform_hint(output: &str, host: &Platform) -> Option<String> {
    let required_arch = ARCH_REQUIREMENT
        .captures_iter(output)
        .filter_map(|c| c.get(1).or_else(|| c.get(2)))
        .map(|m| normalize_arch(m.as_str()).to_owned())
        .find(|arch| *arch != host.arch);

    let required_os = OS_REQUIREMENT
        .captures_iter(output)
        .filter_map(|c| c.get(1).or_else(|| c.get(2)))
        .map(|m| normalize_os(m.as_str()).to_owned())
        .find(|os| *os != host.os);

    match (required_os, required_arch) {
        (None, None) => None,
        (Some(os), None) => Some(format!(
            "This package requires {} but this host runs {}.",
            display_os(&os),
            display_os(&host.os)
        )),
        (None, Some(arch)) => Some(format!(
            "This package requires {arch} but this host is {}.",
            host.arch
        )),
        (Some(os), Some(arch)) => Some(format!(
            "This package requires {} on {arch} but this host is {} on {}.",
            display_os(&os),
            display_os(&host.os),
            host.arch
        )),
    }
}

/// Collapse a failed install into one diagnosable line.
pub fn format_install_failure_message(
    code: Option<i32>,
    stdout: &str,
    stderr: &str,
    host: &Platform,
) -> String {
    let summary = summarize_install_output(stderr).or_else(|| summarize_install_output(stdout));
    let hint = platform_hint(&format!("{stderr}\n{stdout}"), host);

    let detail = match (hint, summary) {
        (Some(hint), Some(summary)) => format!("{hint} {summary}"),
        (Some(hint), None) => hint,
        (None, Some(summary)) => summary,
        (None, None) => return format!("Install failed ({})", exit_label(code)),
    };
    format!("Install failed ({}): {detail}", exit_label(code))
}

fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_summary(s: &str) -> String {
    if s.chars().count() <= MAX_SUMMARY_CHARS {
        return s.to_owned();
    }
    let mut out: String = s.chars().take(MAX_SUMMARY_CHARS - 1).collect();
    out.push('…');
    out
}

fn display_os(os: &str) -> &str {
    match os {
        "macos" => "macOS",
        "linux" => "Linux",
        "windows" => "Windows",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linux_x64() -> Platform {
        Platform::new("linux", "x86_64")
    }

    #[test]
    fn exit_labels() {
        assert_eq!(exit_label(Some(1)), "exit 1");
        assert_eq!(exit_label(None), "unknown exit");
    }

    #[test]
    fn prefers_error_leading_line() {
        let out = "Downloading...\nwarning: slow mirror\nError: formula not found\ndone";
        assert_eq!(
            summarize_install_output(out).as_deref(),
            Some("Error: formula not found")
        );
    }

    #[test]
    fn npm_err_lines_count_as_error_leading() {
        let out = "added 0 packages\nnpm ERR! code E404\nnpm ERR! 404 Not Found";
        assert_eq!(
            summarize_install_output(out).as_deref(),
            Some("npm ERR! code E404")
        );
    }

    #[test]
    fn falls_back_to_failure_keyword_then_last_line() {
        let keyword = "step one\nbuild failed for target\nstep three";
        assert_eq!(
            summarize_install_output(keyword).as_deref(),
            Some("build failed for target")
        );

        let plain = "step one\n\n  step   two  \n\n";
        assert_eq!(summarize_install_output(plain).as_deref(), Some("step two"));
        assert_eq!(summarize_install_output("  \n\n"), None);
    }

    #[test]
    fn long_summary_is_truncated_with_ellipsis() {
        let line = format!("error: {}", "x".repeat(500));
        let summary = summarize_install_output(&line).unwrap();
        assert_eq!(summary.chars().count(), MAX_SUMMARY_CHARS);
        assert!(summary.ends_with('…'));
    }

    #[test]
    fn arch_mismatch_yields_hint() {
        let msg = format_install_failure_message(
            Some(1),
            "",
            "Error: architecture mismatch, required: arm64",
            &linux_x64(),
        );
        assert!(msg.contains("exit 1"), "{msg}");
        assert!(msg.contains("requires arm64"), "{msg}");
        assert!(msg.contains("Error: architecture mismatch"), "{msg}");
        assert!(msg.find("requires arm64") < msg.find("Error: architecture"));
    }

    #[test]
    fn matching_arch_yields_no_hint() {
        let host = Platform::new("macos", "arm64");
        assert_eq!(
            platform_hint("Error: architecture mismatch, required: arm64", &host),
            None
        );
    }

    #[test]
    fn os_requirement_yields_hint() {
        let hint = platform_hint("Error: gh-dash requires macOS", &linux_x64()).unwrap();
        assert!(hint.contains("requires macOS"));
        assert!(hint.contains("Linux"));
    }

    #[test]
    fn homebrew_requirement_wording_yields_hints() {
        let arch = "==> Fetching gum\nError: gum: An unsatisfied requirement failed this build.\n\
                    The arm64 architecture is required for this software.";
        let msg = format_install_failure_message(Some(1), "", arch, &linux_x64());
        assert!(msg.contains("requires arm64 but this host is x64"), "{msg}");
        assert!(msg.contains("Error: gum: An unsatisfied requirement"), "{msg}");

        let os = "Error: gum: An unsatisfied requirement failed this build.\n\
                  macOS is required for this software.";
        let hint = platform_hint(os, &linux_x64()).unwrap();
        assert!(hint.contains("requires macOS"), "{hint}");

        let mac = Platform::new("macos", "arm64");
        assert_eq!(platform_hint(arch, &mac), None);
        assert_eq!(platform_hint(os, &mac), None);
    }

    #[test]
    fn npm_ebadplatform_is_understood() {
        let stderr = r#"npm ERR! notsup Unsupported platform for fsevents@2.3.3: wanted {"os":"darwin","arch":"any"} (current: {"os":"linux","arch":"x64"})"#;
        let hint = platform_hint(stderr, &linux_x64()).unwrap();
        assert!(hint.contains("macOS"), "{hint}");
    }

    #[test]
    fn stderr_takes_priority_over_stdout() {
        let msg = format_install_failure_message(
            Some(2),
            "stdout error: ignored",
            "fatal: repository not found",
            &linux_x64(),
        );
        assert_eq!(msg, "Install failed (exit 2): fatal: repository not found");
    }

    #[test]
    fn no_output_still_reports_exit() {
        assert_eq!(
            format_install_failure_message(None, "", "", &linux_x64()),
            "Install failed (unknown exit)"
        );
    }
}
