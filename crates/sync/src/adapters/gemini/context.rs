//! Inlining of skills, agents and commands into `GEMINI.md`.
//!
//! Gemini has no skill directories, so every item becomes its own managed
//! block `<!-- hsync:<kind>:<name> -->`. Skills lose their on-disk identity
//! but each one stays a distinct, identifiable section.

use super::paths::GeminiPaths;
use crate::adapters::markers::{extract_block, replace_block};
use crate::adapters::traits::SyncContext;
use crate::adapters::utils::{read_optional, write_if_changed};
use crate::common::{item_id, stale_items, AgentDef, CommandDef, SkillRef, TargetLevel};
use crate::frontmatter::split_frontmatter;
use crate::report::{SkipReason, SyncResult};
use crate::Result;
use anyhow::Context;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

/// One rendered section destined for a level's context file.
pub(super) struct Section {
    pub name: String,
    pub level: TargetLevel,
    pub body: std::result::Result<String, String>,
}

pub(super) fn block_tag(kind: &str, name: &str) -> String {
    format!("{kind}:{name}")
}

pub(super) fn skill_section(skill: &SkillRef) -> Section {
    let body = fs::read_to_string(skill.manifest_path())
        .map_err(|e| format!("Failed to read {}: {e}", skill.manifest_path().display()))
        .map(|content| {
            let (_, instructions) = split_frontmatter(&content);
            let mut out = format!("## Skill: {}\n\n", skill.name);
            if let Some(description) = &skill.description {
                out.push_str(&format!("{description}\n\n"));
            }
            out.push_str(instructions.trim());
            out
        });
    Section {
        name: skill.name.clone(),
        level: skill.scope.level(),
        body,
    }
}

pub(super) fn agent_section(agent: &AgentDef) -> Section {
    let mut out = format!("## Agent: {}\n\n{}\n\n", agent.name, agent.description);
    if !agent.tools.is_empty() {
        out.push_str(&format!("Tools: {}\n\n", agent.tools.join(", ")));
    }
    out.push_str(agent.instructions.trim());
    Section {
        name: agent.name.clone(),
        level: agent.scope.level(),
        body: Ok(out),
    }
}

pub(super) fn command_section(command: &CommandDef) -> Section {
    let mut out = format!("## Command: /{}\n\n{}\n\n", command.name, command.description);
    if let Some(hint) = &command.argument_hint {
        out.push_str(&format!("Arguments: {hint}\n\n"));
    }
    out.push_str(command.body.trim());
    Section {
        name: command.name.clone(),
        level: command.scope.level(),
        body: Ok(out),
    }
}

/// Writes every section of `kind`, grouped per level, and drops stale blocks.
pub(super) fn sync_sections(
    home: &Path,
    kind: &str,
    sections: Vec<Section>,
    ctx: &SyncContext,
) -> Result<SyncResult> {
    let mut result = SyncResult::default();
    let levels = ctx.levels();
    let mut by_level: BTreeMap<TargetLevel, Vec<Section>> = BTreeMap::new();
    for section in sections {
        if !levels.contains(&section.level) {
            if section.level == TargetLevel::Project {
                result.skip(SkipReason::NoProjectDir {
                    item: item_id(kind, section.level, &section.name),
                });
            }
            continue;
        }
        by_level.entry(section.level).or_default().push(section);
    }

    let current: BTreeSet<String> = by_level
        .values()
        .flatten()
        .map(|s| item_id(kind, s.level, &s.name))
        .collect();
    let mut stale: BTreeMap<TargetLevel, Vec<&str>> = BTreeMap::new();
    for (level, name) in stale_items(&ctx.previous_items, &current, kind) {
        if levels.contains(&level) {
            stale.entry(level).or_default().push(name);
        }
    }

    for level in levels {
        let sections = by_level.remove(&level).unwrap_or_default();
        let stale = stale.remove(&level).unwrap_or_default();
        if sections.is_empty() && stale.is_empty() {
            continue;
        }
        let Some(paths) = GeminiPaths::for_level(level, home, ctx.project_dir()) else {
            continue;
        };
        write_level(&paths.context, kind, level, &sections, &stale, &mut result)?;
    }
    Ok(result)
}

fn write_level(
    path: &Path,
    kind: &str,
    level: TargetLevel,
    sections: &[Section],
    stale: &[&str],
    result: &mut SyncResult,
) -> Result<()> {
    let original = read_optional(path)?;
    let mut text = original.clone();

    for section in sections {
        let id = item_id(kind, level, &section.name);
        let tag = block_tag(kind, &section.name);
        match &section.body {
            Ok(body) => {
                if extract_block(&text, &tag).map(str::trim) == Some(body.trim()) {
                    result.skip(SkipReason::Unchanged { item: id.clone() });
                } else {
                    text = replace_block(&text, &tag, Some(body));
                    result.synced += 1;
                    result.adapted += 1;
                }
            }
            // Keep whatever was inlined before; the item is still managed.
            Err(error) => result.fail(id.clone(), error),
        }
        result.track(id);
    }

    for name in stale {
        let tag = block_tag(kind, name);
        if extract_block(&text, &tag).is_some() {
            text = replace_block(&text, &tag, None);
            result.removed.push(item_id(kind, level, name));
        }
    }

    if text != original {
        if text.trim().is_empty() {
            fs::remove_file(path).with_context(|| format!("Failed to remove {}", path.display()))?;
        } else {
            write_if_changed(path, &text)?;
        }
    }
    if !sections.is_empty() {
        result.files.push(path.to_path_buf());
    }
    Ok(())
}
