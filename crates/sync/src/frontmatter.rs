//! YAML frontmatter handling for agent, command and skill markdown files.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

// `<role>` ... `</role>` block inside agent bodies.
static ROLE_SECTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<role>\s*(.*?)\s*</role>").expect("valid regex"));

/// Tools may be written as a YAML list or a comma separated string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ToolsField {
    List(Vec<String>),
    Inline(String),
}

impl ToolsField {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            ToolsField::List(list) => list,
            ToolsField::Inline(s) => s
                .split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }
}

/// Fields hsync reads from frontmatter. Unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Frontmatter {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tools: Option<ToolsField>,
    #[serde(default, rename = "argument-hint")]
    pub argument_hint: Option<String>,
}

/// Splits `content` into raw YAML (if any) and the body after the closing `---`.
pub fn split_frontmatter(content: &str) -> (Option<&str>, &str) {
    let trimmed = content.trim_start();
    let Some(after_open) = trimmed.strip_prefix("---") else {
        return (None, content);
    };
    let after_open = after_open.trim_start_matches(['\r', '\n']);

    // An empty frontmatter block closes immediately.
    if let Some(rest) = after_open.strip_prefix("---") {
        return (Some(""), rest.trim_start_matches(['\r', '\n']));
    }

    match after_open.find("\n---") {
        Some(end) => {
            let yaml = after_open[..end].trim_end_matches('\r');
            let rest = &after_open[end + 4..];
            (Some(yaml), rest.trim_start_matches(['\r', '\n']))
        }
        None => (None, content),
    }
}

/// Parses frontmatter and body. Invalid YAML is an error the caller reports per file.
pub fn parse_frontmatter(content: &str) -> Result<(Frontmatter, String), String> {
    let (raw, body) = split_frontmatter(content);
    let frontmatter = match raw {
        Some(yaml) if !yaml.trim().is_empty() => serde_yaml::from_str::<Frontmatter>(yaml)
            .map_err(|e| format!("Invalid YAML frontmatter: {e}"))?,
        _ => Frontmatter::default(),
    };
    Ok((frontmatter, body.to_string()))
}

/// Returns the `<role>` section of an agent body, or the whole body trimmed.
pub fn extract_role(body: &str) -> String {
    ROLE_SECTION
        .captures(body)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| body.trim().to_string())
}

/// First non-empty, non-heading line of a body, used when no description is declared.
pub fn first_paragraph_line(body: &str) -> Option<String> {
    body.lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with('#') && !l.starts_with('<'))
        .map(|l| l.to_string())
}

#[derive(Serialize)]
struct ManifestHeader<'a> {
    name: &'a str,
    description: &'a str,
}

/// Renders a `SKILL.md` manifest wrapping foreign instructions.
pub fn render_skill_manifest(name: &str, description: &str, instructions: &str) -> String {
    let header = ManifestHeader { name, description };
    // Serializing two plain strings cannot fail; fall back to quoting just in case.
    let yaml = serde_yaml::to_string(&header)
        .unwrap_or_else(|_| format!("name: {name:?}\ndescription: {description:?}\n"));
    format!(
        "---\n{yaml}---\n\n{}\n\n## When to Use This Skill\n\n{description}\n",
        instructions.trim()
    )
}
