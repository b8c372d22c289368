//! Pre-install security scanning.
//!
//! The installer scans a skill's directory before every install and turns the
//! findings into warnings.  Scans are advisory: neither findings nor scanner
//! failures block an install.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ScanError;

/// Severity of a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warn,
    Critical,
}

/// A single finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanFinding {
    pub message: String,
    pub file: String,
    pub line: u32,
    pub severity: Severity,
}

/// Result of scanning one directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub critical: u32,
    pub warn: u32,
    pub findings: Vec<ScanFinding>,
}

/// Static code scanner.
#[async_trait]
pub trait SecurityScanner: Send + Sync {
    async fn scan(&self, dir: &Path) -> Result<ScanSummary, ScanError>;
}

/// Scanner that reports nothing.  Used when no scanner is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopScanner;

#[async_trait]
impl SecurityScanner for NoopScanner {
    async fn scan(&self, _dir: &Path) -> Result<ScanSummary, ScanError> {
        Ok(ScanSummary::default())
    }
}

/// Convert a scan outcome into install warnings for `skill`.
pub fn scan_warnings(skill: &str, outcome: &Result<ScanSummary, ScanError>) -> Vec<String> {
    let summary = match outcome {
        Ok(summary) => summary,
        Err(e) => {
            return vec![format!(
                "Skill \"{skill}\" code safety scan failed ({e}). Installation continues; run a security audit after install."
            )];
        }
    };

    let mut warnings = Vec::new();
    if summary.critical > 0 {
        let details: Vec<String> = summary
            .findings
            .iter()
            .filter(|f| f.severity == Severity::Critical)
            .map(|f| format!("{} ({}:{})", f.message, f.file, f.line))
            .collect();
        warnings.push(format!(
            "WARNING: Skill \"{skill}\" contains dangerous code patterns: {}",
            details.join("; ")
        ));
    }
    if summary.warn > 0 {
        warnings.push(format!(
            "Skill \"{skill}\" has {} suspicious code pattern(s). Run a security audit for details.",
            summary.warn
        ));
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(severity: Severity, message: &str) -> ScanFinding {
        ScanFinding {
            message: message.into(),
            file: "run.sh".into(),
            line: 3,
            severity,
        }
    }

    #[tokio::test]
    async fn noop_scanner_is_clean() {
        let summary = NoopScanner.scan(Path::new("/tmp")).await.unwrap();
        assert!(scan_warnings("demo", &Ok(summary)).is_empty());
    }

    #[test]
    fn critical_and_warn_findings_become_warnings() {
        let summary = ScanSummary {
            critical: 1,
            warn: 2,
            findings: vec![
                finding(Severity::Critical, "pipes curl into sh"),
                finding(Severity::Warn, "reads env"),
                finding(Severity::Warn, "uses eval"),
            ],
        };
        let warnings = scan_warnings("demo", &Ok(summary));
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].starts_with("WARNING: Skill \"demo\""));
        assert!(warnings[0].contains("pipes curl into sh (run.sh:3)"));
        assert!(!warnings[0].contains("reads env"));
        assert!(warnings[1].contains("2 suspicious"));
    }

    #[test]
    fn scanner_error_is_one_warning_naming_the_skill() {
        let warnings = scan_warnings("demo", &Err(ScanError("boom".into())));
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("\"demo\""));
        assert!(warnings[0].contains("boom"));
    }
}
