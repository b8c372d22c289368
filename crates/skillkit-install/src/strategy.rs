//! Install strategy resolution.
//!
//! Maps an [`InstallSpec`] plus [`InstallPreferences`] to the argv of the
//! package-manager command that performs it.  Pure: nothing here touches the
//! filesystem or spawns processes.

use crate::error::{InstallError, Result};
use crate::types::{InstallKind, InstallPreferences, InstallSpec, NodeManager, SkillEntry};

/// The id an install spec is addressed by: its explicit `id`, or
/// `<kind>-<index>` for its position in the manifest.
pub fn resolve_install_id(spec: &InstallSpec, index: usize) -> String {
    match spec.id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => id.to_owned(),
        _ => format!("{}-{index}", spec.kind.name()),
    }
}

/// Find the install spec with the given resolved id.  First match wins.
pub fn find_install_spec<'a>(entry: &'a SkillEntry, install_id: &str) -> Option<&'a InstallSpec> {
    entry
        .install
        .iter()
        .enumerate()
        .find(|(index, spec)| resolve_install_id(spec, *index) == install_id)
        .map(|(_, spec)| spec)
}

/// Build the command for a package-manager install.
///
/// Returns [`InstallError::MalformedSpec`] when the kind's mandatory field is
/// missing or blank, and [`InstallError::DownloadHandledElsewhere`] for
/// `download` specs.
pub fn build_install_command(
    spec: &InstallSpec,
    prefs: &InstallPreferences,
) -> Result<Vec<String>> {
    match &spec.kind {
        InstallKind::Brew { formula } => {
            let formula = required("brew", "formula", formula)?;
            Ok(argv(&["brew", "install", formula]))
        }
        InstallKind::Node { package } => {
            let package = required("node", "package", package)?;
            Ok(node_install_command(prefs.node_manager, package))
        }
        InstallKind::Go { module } => {
            let module = required("go", "module", module)?;
            Ok(argv(&["go", "install", module]))
        }
        InstallKind::Uv { package } => {
            let package = required("uv", "package", package)?;
            Ok(argv(&["uv", "tool", "install", package]))
        }
        InstallKind::Download { .. } => Err(InstallError::DownloadHandledElsewhere),
    }
}

/// Global install command for a node package under the given manager.
pub fn node_install_command(manager: NodeManager, package: &str) -> Vec<String> {
    match manager {
        NodeManager::Npm => argv(&["npm", "install", "-g", "--ignore-scripts", package]),
        NodeManager::Pnpm => argv(&["pnpm", "add", "-g", "--ignore-scripts", package]),
        NodeManager::Yarn => argv(&["yarn", "global", "add", "--ignore-scripts", package]),
        NodeManager::Bun => argv(&["bun", "add", "-g", "--ignore-scripts", package]),
    }
}

/// Display label: the manifest's `label`, else one derived from the kind.
pub fn install_label(spec: &InstallSpec) -> String {
    if let Some(label) = spec.label.as_deref().map(str::trim)
        && !label.is_empty()
    {
        return label.to_owned();
    }
    let target = match &spec.kind {
        InstallKind::Brew { formula } => formula.as_deref(),
        InstallKind::Node { package } | InstallKind::Uv { package } => package.as_deref(),
        InstallKind::Go { module } => module.as_deref(),
        InstallKind::Download { url, .. } => {
            return format!("Download {}", url.as_deref().unwrap_or("(no url)"));
        }
    };
    format!(
        "Install {} ({})",
        target.unwrap_or("(unspecified)"),
        spec.kind.name()
    )
}

fn required<'a>(
    kind: &'static str,
    field: &'static str,
    value: &'a Option<String>,
) -> Result<&'a str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(InstallError::MalformedSpec { kind, field })
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| (*s).to_owned()).collect()
}
