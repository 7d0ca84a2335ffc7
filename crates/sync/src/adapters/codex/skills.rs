//! Skills, plus agents and commands converted into Codex skills.
//!
//! Codex has no agent or command concept; each becomes a generated
//! `skills/agent-<name>/SKILL.md` or `skills/cmd-<name>/SKILL.md`.

use super::paths::{agent_skill_name, command_skill_name, CodexPaths};
use crate::adapters::links::{cleanup_stale, is_foreign, place_link, remove_managed, write_marker};
use crate::adapters::traits::SyncContext;
use crate::adapters::utils::{sanitize_name, write_if_changed};
use crate::common::{item_id, AgentDef, CommandDef, SkillRef, TargetLevel};
use crate::frontmatter::render_skill_manifest;
use crate::report::{SkipReason, SyncResult};
use crate::Result;
use anyhow::Context;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

fn skills_dir(home: &Path, level: TargetLevel, ctx: &SyncContext) -> Option<PathBuf> {
    if !ctx.levels().contains(&level) {
        return None;
    }
    CodexPaths::for_level(level, home, ctx.project_dir()).map(|p| p.skills_dir)
}

/// Resolves the skills directory for an item, recording why when there is none.
fn dir_for(
    home: &Path,
    level: TargetLevel,
    id: &str,
    ctx: &SyncContext,
    result: &mut SyncResult,
) -> Option<PathBuf> {
    let dir = skills_dir(home, level, ctx);
    if dir.is_none() && level == TargetLevel::Project {
        result.skip(SkipReason::NoProjectDir {
            item: id.to_string(),
        });
    }
    dir
}

pub fn sync_skills(
    home: &Path,
    skills: &BTreeMap<String, SkillRef>,
    ctx: &SyncContext,
) -> Result<SyncResult> {
    let mut result = SyncResult::default();
    for skill in skills.values() {
        let level = skill.scope.level();
        let id = item_id("skill", level, &skill.name);
        let Some(dir) = dir_for(home, level, &id, ctx, &mut result) else {
            continue;
        };
        place_link(&skill.path, &dir.join(sanitize_name(&skill.name)), &id, ctx, &mut result)?;
    }
    cleanup_stale(
        "skill",
        ctx,
        &mut result,
        |level, name| skills_dir(home, level, ctx).map(|d| d.join(sanitize_name(name))),
        remove_managed,
    )?;
    Ok(result)
}

pub fn sync_agents(
    home: &Path,
    agents: &BTreeMap<String, AgentDef>,
    ctx: &SyncContext,
) -> Result<SyncResult> {
    let mut result = SyncResult::default();
    for agent in agents.values() {
        let level = agent.scope.level();
        let id = item_id("agent", level, &agent.name);
        let Some(dir) = dir_for(home, level, &id, ctx, &mut result) else {
            continue;
        };
        let skill_name = agent_skill_name(&sanitize_name(&agent.name));
        let manifest = render_skill_manifest(&skill_name, &agent.description, &agent_instructions(agent));
        place_generated(&dir.join(&skill_name), &agent.path, &manifest, &id, ctx, &mut result)?;
    }
    cleanup_stale(
        "agent",
        ctx,
        &mut result,
        |level, name| {
            skills_dir(home, level, ctx).map(|d| d.join(agent_skill_name(&sanitize_name(name))))
        },
        remove_managed,
    )?;
    Ok(result)
}

pub fn sync_commands(
    home: &Path,
    commands: &BTreeMap<String, CommandDef>,
    ctx: &SyncContext,
) -> Result<SyncResult> {
    let mut result = SyncResult::default();
    for command in commands.values() {
        let level = command.scope.level();
        let id = item_id("command", level, &command.name);
        let Some(dir) = dir_for(home, level, &id, ctx, &mut result) else {
            continue;
        };
        let skill_name = command_skill_name(&sanitize_name(&command.name));
        let manifest =
            render_skill_manifest(&skill_name, &command.description, &command_instructions(command));
        place_generated(&dir.join(&skill_name), &command.path, &manifest, &id, ctx, &mut result)?;
    }
    cleanup_stale(
        "command",
        ctx,
        &mut result,
        |level, name| {
            skills_dir(home, level, ctx).map(|d| d.join(command_skill_name(&sanitize_name(name))))
        },
        remove_managed,
    )?;
    Ok(result)
}

fn agent_instructions(agent: &AgentDef) -> String {
    let mut out = agent.instructions.trim().to_string();
    if !agent.tools.is_empty() {
        out.push_str(&format!("\n\nTools this agent relies on: {}", agent.tools.join(", ")));
    }
    out
}

fn command_instructions(command: &CommandDef) -> String {
    let body = command.body.trim();
    match &command.argument_hint {
        Some(hint) => format!("Arguments: {hint}\n\n{body}"),
        None => body.to_string(),
    }
}

/// Writes a generated skill directory, owned through its marker file.
fn place_generated(
    dir: &Path,
    source: &Path,
    manifest: &str,
    id: &str,
    ctx: &SyncContext,
    result: &mut SyncResult,
) -> Result<()> {
    if is_foreign(dir, id, ctx) {
        result.skip(SkipReason::Unmanaged {
            item: id.to_string(),
            path: dir.to_path_buf(),
        });
        return Ok(());
    }
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let manifest_path = dir.join("SKILL.md");
    if write_if_changed(&manifest_path, manifest)? {
        result.synced += 1;
        result.adapted += 1;
    } else {
        result.skip(SkipReason::Unchanged {
            item: id.to_string(),
        });
    }
    write_marker(dir, source)?;
    result.files.push(manifest_path);
    result.track(id);
    Ok(())
}
