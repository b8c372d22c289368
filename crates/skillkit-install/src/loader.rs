//! Skill manifest loading.
//!
//! The installer never reads manifests itself; it asks a [`ManifestLoader`]
//! for the skills visible from a workspace.  [`WorkspaceLoader`] walks
//! `<workspace>/skills/` and parses every `<name>/SKILL.md` it finds.
//! Directories without a manifest are skipped, and a manifest that fails to
//! parse is logged and skipped so one broken skill cannot hide the others.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::SkillError;
use crate::parser::parse_skill_md;
use crate::types::SkillEntry;

/// Name of the manifest file inside a skill directory.
pub const MANIFEST_FILE: &str = "SKILL.md";

/// Directory under the workspace that holds skills.
pub const SKILLS_DIR: &str = "skills";

/// Source of skill entries for a workspace.
#[async_trait]
pub trait ManifestLoader: Send + Sync {
    async fn load_entries(&self, workspace: &Path) -> Result<Vec<SkillEntry>, SkillError>;
}

/// Loads skills from `<workspace>/skills/*/SKILL.md`.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceLoader {
    extra_dirs: Vec<PathBuf>,
}

impl WorkspaceLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also scan `dir` (after the workspace).  The first skill loaded under a
    /// given name wins.
    pub fn with_extra_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.extra_dirs.push(dir.into());
        self
    }
}

#[async_trait]
impl ManifestLoader for WorkspaceLoader {
    async fn load_entries(&self, workspace: &Path) -> Result<Vec<SkillEntry>, SkillError> {
        let mut entries = load_skills_from_dir(&workspace.join(SKILLS_DIR), "workspace").await?;

        for dir in &self.extra_dirs {
            for entry in load_skills_from_dir(dir, "extra").await? {
                if !entries.iter().any(|e| e.name == entry.name) {
                    entries.push(entry);
                }
            }
        }

        tracing::debug!(
            count = entries.len(),
            workspace = %workspace.display(),
            "skills loaded"
        );
        Ok(entries)
    }
}

/// Load every skill directly under `dir`.
///
/// A missing `dir` yields an empty list.  Entries are sorted by directory
/// name so lookups are deterministic.
pub async fn load_skills_from_dir(dir: &Path, source: &str) -> Result<Vec<SkillEntry>, SkillError> {
    if !tokio::fs::try_exists(dir).await.unwrap_or(false) {
        tracing::debug!(path = %dir.display(), "skills directory does not exist");
        return Ok(Vec::new());
    }

    let mut skill_dirs = Vec::new();
    let mut read_dir = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = read_dir.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            skill_dirs.push(entry.path());
        }
    }
    skill_dirs.sort();

    let mut skills = Vec::new();
    for skill_dir in skill_dirs {
        let manifest = skill_dir.join(MANIFEST_FILE);
        if !tokio::fs::try_exists(&manifest).await.unwrap_or(false) {
            tracing::trace!(path = %skill_dir.display(), "no SKILL.md, skipping");
            continue;
        }

        match load_skill_from_file(&manifest, source).await {
            Ok(skill) => {
                tracing::debug!(
                    name = %skill.name,
                    install_specs = skill.install.len(),
                    "loaded skill"
                );
                skills.push(skill);
            }
            Err(e) => {
                tracing::warn!(
                    path = %manifest.display(),
                    error = %e,
                    "failed to load skill"
                );
            }
        }
    }

    Ok(skills)
}

/// Load a single skill from its `SKILL.md` path.
pub async fn load_skill_from_file(path: &Path, source: &str) -> Result<SkillEntry, SkillError> {
    let content = tokio::fs::read_to_string(path).await?;
    let mut entry = parse_skill_md(&content, path)?;
    entry.source = source.to_owned();
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_skill(root: &Path, dir: &str, manifest: &str) {
        let skill_dir = root.join(dir);
        std::fs::create_dir_all(&skill_dir).unwrap();
        std::fs::write(skill_dir.join(MANIFEST_FILE), manifest).unwrap();
    }

    #[tokio::test]
    async fn missing_skills_dir_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let entries = WorkspaceLoader::new().load_entries(tmp.path()).await.unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn loads_workspace_skills_and_skips_broken_ones() {
        let tmp = tempfile::tempdir().unwrap();
        let skills = tmp.path().join(SKILLS_DIR);
        write_skill(
            &skills,
            "beta",
            "---\nname: beta\ninstall:\n  - kind: brew\n    formula: jq\n---\n",
        );
        write_skill(&skills, "alpha", "---\nname: alpha\n---\nbody");
        write_skill(&skills, "broken", "no frontmatter here");
        std::fs::create_dir_all(skills.join("empty")).unwrap();
        std::fs::write(skills.join("README.md"), "not a skill").unwrap();

        let entries = WorkspaceLoader::new().load_entries(tmp.path()).await.unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "beta"]);
        assert_eq!(entries[1].install.len(), 1);
        assert_eq!(entries[0].source, "workspace");
        assert_eq!(entries[0].base_dir, skills.join("alpha"));
    }

    #[tokio::test]
    async fn workspace_skills_shadow_extra_dirs() {
        let ws = tempfile::tempdir().unwrap();
        let extra = tempfile::tempdir().unwrap();
        write_skill(&ws.path().join(SKILLS_DIR), "gh", "---\nname: gh\ndescription: local\n---\n");
        write_skill(extra.path(), "gh", "---\nname: gh\ndescription: shared\n---\n");
        write_skill(extra.path(), "jq", "---\nname: jq\n---\n");

        let entries = WorkspaceLoader::new()
            .with_extra_dir(extra.path())
            .load_entries(ws.path())
            .await
            .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].description, "local");
        assert_eq!(entries[1].name, "jq");
        assert_eq!(entries[1].source, "extra");
    }
}
