//! SKILL.md manifest parser.
//!
//! A SKILL.md file starts with a YAML frontmatter block delimited by `---`
//! lines.  Only the frontmatter matters to the installer:
//!
//! ```text
//! ---
//! name: gh-issues
//! description: Triage GitHub issues.
//! metadata:
//!   openclaw:
//!     requires:
//!       bins:
//!         - gh
//!     install:
//!       - id: brew
//!         kind: brew
//!         formula: gh
//!         bins: [gh]
//! ---
//! ```
//!
//! `metadata` may also be written as a (possibly multi-line) JSON object,
//! trailing commas allowed, which is how most published skills declare
//! their install specs.

use std::path::Path;

use tracing::warn;

use crate::error::SkillError;
use crate::types::{InstallSpec, SkillEntry, SkillRequirements};

/// Source label for skills parsed without a loader.
const DEFAULT_SOURCE: &str = "workspace";

#[derive(Debug, serde::Deserialize)]
struct RawFrontmatter {
    name: Option<String>,
    description: Option<String>,
    #[serde(default)]
    metadata: Option<RawMetadataWrapper>,
    // Flat form: `requires` / `install` at the top level.
    requires: Option<RawRequirements>,
    #[serde(default)]
    install: Vec<serde_json::Value>,
}

/// The nested `metadata.openclaw` block.
#[derive(Debug, serde::Deserialize)]
struct RawMetadataWrapper {
    openclaw: Option<RawInstallMetadata>,
    /// Legacy name.
    clawdbot: Option<RawInstallMetadata>,
}

#[derive(Debug, serde::Deserialize)]
struct RawInstallMetadata {
    requires: Option<RawRequirements>,
    #[serde(default)]
    install: Vec<serde_json::Value>,
}

#[derive(Debug, serde::Deserialize)]
struct RawRequirements {
    #[serde(default)]
    env: Vec<String>,
    #[serde(default)]
    bins: Vec<String>,
    #[serde(default, rename = "anyBins")]
    any_bins: Vec<String>,
}

impl From<&RawRequirements> for SkillRequirements {
    fn from(raw: &RawRequirements) -> Self {
        Self {
            env: raw.env.clone(),
            bins: raw.bins.clone(),
            any_bins: raw.any_bins.clone(),
        }
    }
}

/// Split a SKILL.md file into YAML frontmatter and markdown body.
fn split_frontmatter(content: &str) -> Option<(&str, &str)> {
    let content = content.trim_start_matches('\u{feff}').trim_start();
    let after_first = content.strip_prefix("---")?;
    let end = after_first.find("\n---")?;
    let yaml = after_first[..end].trim();
    let body = after_first[end + 4..].trim_start_matches(['\n', '\r']);
    Some((yaml, body))
}

/// Parse a SKILL.md file into a [`SkillEntry`].
///
/// `base_dir` is the manifest's parent directory.  Install specs with an
/// unknown kind are skipped with a warning rather than failing the skill.
pub fn parse_skill_md(content: &str, path: &Path) -> Result<SkillEntry, SkillError> {
    let (yaml, _body) = split_frontmatter(content).ok_or_else(|| SkillError::InvalidFormat {
        path: path.to_path_buf(),
        reason: "missing YAML frontmatter (must start with ---)".into(),
    })?;

    let frontmatter: RawFrontmatter =
        parse_yaml_via_json(yaml).map_err(|reason| SkillError::InvalidFormat {
            path: path.to_path_buf(),
            reason: format!("frontmatter parse error: {reason}"),
        })?;

    let name = frontmatter
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| SkillError::MissingField {
            path: path.to_path_buf(),
            field: "name".into(),
        })?
        .to_owned();

    let nested = frontmatter
        .metadata
        .as_ref()
        .and_then(|m| m.openclaw.as_ref().or(m.clawdbot.as_ref()));

    let requires = nested
        .and_then(|m| m.requires.as_ref())
        .or(frontmatter.requires.as_ref())
        .map(SkillRequirements::from)
        .unwrap_or_default();

    let raw_install = match nested {
        Some(m) if !m.install.is_empty() => &m.install,
        _ => &frontmatter.install,
    };
    let install = raw_install
        .iter()
        .enumerate()
        .filter_map(|(index, value)| {
            match serde_json::from_value::<InstallSpec>(value.clone()) {
                Ok(spec) => Some(spec),
                Err(e) => {
                    warn!(skill = %name, index, error = %e, "skipping invalid install spec");
                    None
                }
            }
        })
        .collect();

    Ok(SkillEntry {
        description: frontmatter.description.clone().unwrap_or_default(),
        base_dir: path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default(),
        source: DEFAULT_SOURCE.to_owned(),
        file_path: path.to_path_buf(),
        requires,
        install,
        name,
    })
}

// ---------------------------------------------------------------------------
// Minimal YAML parser
// ---------------------------------------------------------------------------

/// Parse the YAML subset used in SKILL.md frontmatter by converting it to
/// JSON first:
/// - key/value pairs and nested objects
/// - lists of scalars and lists of objects (`- key: value`)
/// - inline or multi-line JSON values
fn parse_yaml_via_json<T: serde::de::DeserializeOwned>(yaml: &str) -> Result<T, String> {
    let value = yaml_to_json(yaml)?;
    serde_json::from_value(value).map_err(|e| e.to_string())
}

fn yaml_to_json(yaml: &str) -> Result<serde_json::Value, String> {
    let lines: Vec<&str> = yaml.lines().collect();
    let mut root = serde_json::Map::new();
    parse_yaml_block(&lines, &mut root, 0)?;
    Ok(serde_json::Value::Object(root))
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

fn parse_yaml_block(
    lines: &[&str],
    map: &mut serde_json::Map<String, serde_json::Value>,
    base_indent: usize,
) -> Result<(), String> {
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        let trimmed = line.trim();

        if trimmed.is_empty() || trimmed.starts_with('#') {
            i += 1;
            continue;
        }

        let indent = indent_of(line);
        if indent < base_indent {
            break;
        }

        let Some(colon_pos) = trimmed.find(':') else {
            i += 1;
            continue;
        };
        let key = trimmed[..colon_pos]
            .trim()
            .trim_matches('"')
            .trim_matches('\'')
            .to_owned();
        let value_part = trimmed[colon_pos + 1..].trim();
        i += 1;

        let block_end = find_block_end(lines, i, indent + 1);

        if value_part.starts_with('{') || value_part.starts_with('[') {
            // Inline JSON, possibly continued on the following lines.
            let mut text = value_part.to_owned();
            for l in &lines[i..block_end] {
                text.push('\n');
                text.push_str(l);
            }
            let value = match parse_json_lenient(&text) {
                Ok(v) => {
                    i = block_end;
                    v
                }
                Err(_) => parse_yaml_value(value_part),
            };
            map.insert(key, value);
            continue;
        }

        if !value_part.is_empty() {
            map.insert(key, parse_yaml_value(value_part));
            continue;
        }

        let child = &lines[i..block_end];
        i = block_end;
        let Some(first) = child.iter().map(|l| l.trim()).find(|l| !l.is_empty()) else {
            map.insert(key, serde_json::Value::Null);
            continue;
        };

        let value = if first.starts_with('{') || first.starts_with('[') {
            parse_json_lenient(&child.join("\n"))?
        } else if first.starts_with("- ") || first == "-" {
            serde_json::Value::Array(parse_yaml_list(child)?)
        } else {
            let mut child_map = serde_json::Map::new();
            let child_indent = child
                .iter()
                .find(|l| !l.trim().is_empty())
                .map(|l| indent_of(l))
                .unwrap_or(indent + 2);
            parse_yaml_block(child, &mut child_map, child_indent)?;
            serde_json::Value::Object(child_map)
        };
        map.insert(key, value);
    }

    Ok(())
}

/// Parse `- item` lines.  An item whose text looks like `key: value` starts
/// a nested object that continues on the more-indented lines below it.
fn parse_yaml_list(lines: &[&str]) -> Result<Vec<serde_json::Value>, String> {
    let mut items = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            i += 1;
            continue;
        }
        let Some(item) = trimmed.strip_prefix('-') else {
            break;
        };
        let item = item.trim();
        let indent = indent_of(line);
        i += 1;

        if is_mapping_item(item) {
            // Re-indent the first key so it lines up with its siblings.
            let item_indent = indent + 2;
            let first = format!("{}{item}", " ".repeat(item_indent));
            let end = find_block_end(lines, i, indent + 1);
            let mut block: Vec<&str> = vec![first.as_str()];
            block.extend_from_slice(&lines[i..end]);
            i = end;

            let mut object = serde_json::Map::new();
            parse_yaml_block(&block, &mut object, item_indent)?;
            items.push(serde_json::Value::Object(object));
        } else if item.starts_with('{') || item.starts_with('[') {
            items.push(parse_yaml_value(item));
        } else {
            let val = item.trim_matches('"').trim_matches('\'');
            items.push(serde_json::Value::String(val.to_owned()));
        }
    }

    Ok(items)
}

fn is_mapping_item(item: &str) -> bool {
    if item.starts_with(['"', '\'', '{', '[']) {
        return false;
    }
    item.find(':')
        .is_some_and(|pos| item[pos + 1..].is_empty() || item[pos + 1..].starts_with(' '))
}

/// Index of the first non-blank line at `start` or later whose indent is
/// below `min_indent`.
fn find_block_end(lines: &[&str], start: usize, min_indent: usize) -> usize {
    let mut end = start;
    while end < lines.len() {
        let line = lines[end];
        if !line.trim().is_empty() && indent_of(line) < min_indent {
            break;
        }
        end += 1;
    }
    end
}

/// Parse JSON, tolerating the trailing commas common in hand-written
/// manifests.
fn parse_json_lenient(text: &str) -> Result<serde_json::Value, String> {
    serde_json::from_str(text)
        .or_else(|_| serde_json::from_str(&strip_trailing_commas(text)))
        .map_err(|e| e.to_string())
}

/// Remove commas that directly precede `}` or `]`, outside string literals.
fn strip_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for (idx, &c) in chars.iter().enumerate() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            ',' => {
                let next = chars[idx + 1..].iter().find(|ch| !ch.is_whitespace());
                if !matches!(next, Some('}') | Some(']')) {
                    out.push(c);
                }
            }
            _ => out.push(c),
        }
    }
    out
}

fn parse_yaml_value(s: &str) -> serde_json::Value {
    let s = s.trim();
    if s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')))
    {
        return serde_json::Value::String(s[1..s.len() - 1].to_owned());
    }

    // Flow sequence: `["a", "b"]` or `[a, b]`.
    if s.starts_with('[') && s.ends_with(']') {
        if let Ok(v) = parse_json_lenient(s) {
            return v;
        }
        let inner = s[1..s.len() - 1].trim();
        if inner.is_empty() {
            return serde_json::Value::Array(Vec::new());
        }
        let items = inner
            .split(',')
            .map(|item| item.trim().trim_matches('"').trim_matches('\''))
            .filter(|item| !item.is_empty())
            .map(|item| serde_json::Value::String(item.to_owned()))
            .collect();
        return serde_json::Value::Array(items);
    }

    if s.starts_with('{')
        && s.ends_with('}')
        && let Ok(v) = parse_json_lenient(s)
    {
        return v;
    }

    match s {
        "true" | "yes" | "on" => return serde_json::Value::Bool(true),
        "false" | "no" | "off" => return serde_json::Value::Bool(false),
        "null" | "~" => return serde_json::Value::Null,
        _ => {}
    }

    if let Ok(n) = s.parse::<i64>() {
        return serde_json::Value::Number(n.into());
    }
    if let Ok(n) = s.parse::<f64>()
        && let Some(n) = serde_json::Number::from_f64(n)
    {
        return serde_json::Value::Number(n);
    }

    serde_json::Value::String(s.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ArchiveType, InstallKind};

    #[test]
    fn parse_nested_yaml_install_specs() {
        let content = r#"---
name: gh-issues
description: Triage GitHub issues.
metadata:
  openclaw:
    requires:
      bins:
        - gh
      anyBins: [python3, python]
    install:
      - id: brew
        kind: brew
        formula: gh
        bins: [gh]
        label: Install GitHub CLI (brew)
      - kind: download
        url: https://example.com/gh.tar.gz
        stripComponents: 1
---

# GitHub issues
"#;

        let entry = parse_skill_md(content, Path::new("/ws/skills/gh-issues/SKILL.md")).unwrap();
        assert_eq!(entry.name, "gh-issues");
        assert_eq!(entry.description, "Triage GitHub issues.");
        assert_eq!(entry.base_dir, Path::new("/ws/skills/gh-issues"));
        assert_eq!(entry.requires.bins, vec!["gh"]);
        assert_eq!(entry.requires.any_bins, vec!["python3", "python"]);
        assert_eq!(entry.install.len(), 2);

        let brew = &entry.install[0];
        assert_eq!(brew.id.as_deref(), Some("brew"));
        assert_eq!(brew.label.as_deref(), Some("Install GitHub CLI (brew)"));
        assert_eq!(brew.bins, vec!["gh"]);
        assert_eq!(
            brew.kind,
            InstallKind::Brew {
                formula: Some("gh".into())
            }
        );

        match &entry.install[1].kind {
            InstallKind::Download {
                url,
                strip_components,
                ..
            } => {
                assert_eq!(url.as_deref(), Some("https://example.com/gh.tar.gz"));
                assert_eq!(*strip_components, Some(1));
            }
            other => panic!("expected download, got {other:?}"),
        }
    }

    #[test]
    fn parse_multiline_json_metadata_with_trailing_commas() {
        let content = r#"---
name: video-frames
description: Extract frames.
metadata:
  {
    "openclaw":
      {
        "requires": { "bins": ["ffmpeg"] },
        "install":
          [
            {
              "id": "zip",
              "kind": "download",
              "url": "https://example.com/tool.bin",
              "archive": "zip",
              "extract": false,
            },
          ],
      },
  }
---
body
"#;

        let entry = parse_skill_md(content, Path::new("SKILL.md")).unwrap();
        assert_eq!(entry.requires.bins, vec!["ffmpeg"]);
        assert_eq!(entry.install.len(), 1);
        match &entry.install[0].kind {
            InstallKind::Download {
                archive, extract, ..
            } => {
                assert_eq!(*archive, Some(ArchiveType::Zip));
                assert_eq!(*extract, Some(false));
            }
            other => panic!("expected download, got {other:?}"),
        }
    }

    #[test]
    fn parse_inline_json_metadata() {
        let content = r#"---
name: weather
metadata: {"openclaw":{"requires":{"bins":["curl"]},"install":[{"kind":"node","package":"wttr-cli"}]}}
---
"#;
        let entry = parse_skill_md(content, Path::new("SKILL.md")).unwrap();
        assert_eq!(entry.requires.bins, vec!["curl"]);
        assert_eq!(
            entry.install[0].kind,
            InstallKind::Node {
                package: Some("wttr-cli".into())
            }
        );
    }

    #[test]
    fn legacy_and_flat_layouts_are_accepted() {
        let legacy = "---\nname: a\nmetadata:\n  clawdbot:\n    requires:\n      bins: [jq]\n---\n";
        let entry = parse_skill_md(legacy, Path::new("SKILL.md")).unwrap();
        assert_eq!(entry.requires.bins, vec!["jq"]);

        let flat = "---\nname: b\nrequires:\n  bins:\n    - rg\ninstall:\n  - kind: go\n    module: example.com/x@latest\n---\n";
        let entry = parse_skill_md(flat, Path::new("SKILL.md")).unwrap();
        assert_eq!(entry.requires.bins, vec!["rg"]);
        assert_eq!(entry.install[0].kind.name(), "go");
    }

    #[test]
    fn unknown_install_kind_is_skipped() {
        let content = "---\nname: c\ninstall:\n  - kind: apt\n    package: x\n  - kind: uv\n    package: ruff\n---\n";
        let entry = parse_skill_md(content, Path::new("SKILL.md")).unwrap();
        assert_eq!(entry.install.len(), 1);
        assert_eq!(entry.install[0].kind.name(), "uv");
    }

    #[test]
    fn missing_name_fails() {
        let content = "---\ndescription: no name\n---\nbody\n";
        assert!(matches!(
            parse_skill_md(content, Path::new("SKILL.md")),
            Err(SkillError::MissingField { .. })
        ));
    }

    #[test]
    fn missing_frontmatter_fails() {
        let content = "# No frontmatter\nJust markdown.";
        assert!(matches!(
            parse_skill_md(content, Path::new("SKILL.md")),
            Err(SkillError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn split_frontmatter_works() {
        let (yaml, body) = split_frontmatter("---\nfoo: bar\n---\nbody here").unwrap();
        assert_eq!(yaml, "foo: bar");
        assert_eq!(body, "body here");
    }

    #[test]
    fn yaml_nested_and_lists() {
        let v = yaml_to_json("metadata:\n  openclaw:\n    emoji: x\nitems:\n  - one\n  - two").unwrap();
        assert_eq!(v["metadata"]["openclaw"]["emoji"], "x");
        assert_eq!(v["items"], serde_json::json!(["one", "two"]));
    }

    #[test]
    fn yaml_inline_arrays() {
        let v = yaml_to_json("a: [\"x\", \"y\"]\nb: [p, q]\nc: []").unwrap();
        assert_eq!(v["a"], serde_json::json!(["x", "y"]));
        assert_eq!(v["b"], serde_json::json!(["p", "q"]));
        assert_eq!(v["c"], serde_json::json!([]));
    }

    #[test]
    fn trailing_commas_outside_strings_only() {
        assert_eq!(
            strip_trailing_commas(r#"{"a": [1, 2,], "b": "x,}",}"#),
            r#"{"a": [1, 2], "b": "x,}"}"#
        );
    }
}
