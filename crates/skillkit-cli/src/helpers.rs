//! Shared helper functions used across CLI subcommands.
//!
//! Includes tracing initialization and the text renderers for install
//! results and option listings.

use std::fmt::Write as _;

use skillkit_install::{InstallOption, InstallResult, SkillEntry};
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Initialize the tracing subscriber with the given default log level.
///
/// Logs go to stderr so that `--json` output on stdout stays parseable.
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Human-readable form of an install result.
pub fn render_result(result: &InstallResult) -> String {
    let mut out = String::new();
    for warning in &result.warnings {
        let _ = writeln!(out, "warning: {warning}");
    }
    let status = if result.ok { "ok" } else { "error" };
    let _ = writeln!(out, "{status}: {}", result.message);
    if !result.ok {
        let stderr = result.stderr.trim();
        if !stderr.is_empty() {
            let _ = writeln!(out, "\n{stderr}");
        }
    }
    out
}

/// One line per skill: name, option count, description.
pub fn render_skills(skills: &[SkillEntry]) -> String {
    if skills.is_empty() {
        return "No skills found.\n".into();
    }
    let width = skills.iter().map(|s| s.name.len()).max().unwrap_or(0);
    let mut out = String::new();
    for skill in skills {
        let _ = writeln!(
            out,
            "{:<width$}  {} option(s)  {}",
            skill.name,
            skill.install.len(),
            skill.description
        );
    }
    out
}

/// Install options of one skill, marking unmet prerequisites.
pub fn render_options(skill: &str, options: &[InstallOption]) -> String {
    if options.is_empty() {
        return format!("{skill} declares no install options.\n");
    }
    let mut out = format!("{skill}:\n");
    for option in options {
        let _ = write!(out, "  {:<12} [{}] {}", option.id, option.kind, option.label);
        if !option.missing_bins.is_empty() {
            let _ = write!(out, " (missing: {})", option.missing_bins.join(", "));
        }
        out.push('\n');
    }
    out
}
