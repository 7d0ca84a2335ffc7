//! Skills, agents and commands from user, project and plugin directories.

use super::plugins::Plugin;
use super::{read_text, ReadLog, SourceConfig};
use crate::adapters::utils::{hash_file, is_hidden_component};
use crate::common::{AgentDef, CommandDef, Scope, SkillRef, SyncScope};
use crate::frontmatter::{extract_role, first_paragraph_line, parse_frontmatter};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Direct children of `dir`, sorted, hidden entries excluded. Missing dirs are empty.
fn children(dir: &Path) -> Vec<PathBuf> {
    if !dir.is_dir() {
        return Vec::new();
    }
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| !is_hidden_component(&e.file_name().to_string_lossy()))
        .map(|e| e.into_path())
        .collect()
}

fn markdown_files(dir: &Path) -> Vec<PathBuf> {
    children(dir)
        .into_iter()
        .filter(|p| p.is_file() && p.extension().is_some_and(|e| e == "md"))
        .collect()
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Directories to scan for one asset kind, lowest precedence first.
fn asset_dirs(
    config: &SourceConfig,
    scope: SyncScope,
    plugins: &[Plugin],
    user: PathBuf,
    plugin_dir: impl Fn(&Plugin) -> PathBuf,
    project_child: &str,
) -> Vec<(Scope, PathBuf)> {
    let mut dirs: Vec<(Scope, PathBuf)> = plugins.iter().map(|p| (Scope::Plugin, plugin_dir(p))).collect();
    dirs.push((Scope::User, user));
    dirs.extend(config.project_dot(project_child).map(|p| (Scope::Project, p)));
    dirs.retain(|(s, _)| scope.includes(*s));
    dirs
}

/// Inserts `item` unless an entry of higher precedence holds the name.
/// Between two plugins the first one discovered wins.
fn insert_ranked<T>(
    map: &mut BTreeMap<String, T>,
    name: String,
    item: T,
    scope_of: impl Fn(&T) -> Scope,
    kind: &str,
    log: &mut ReadLog,
) {
    match map.get(&name) {
        Some(existing) if scope_of(existing) > scope_of(&item) => {}
        Some(existing) if scope_of(existing) == Scope::Plugin && scope_of(&item) == Scope::Plugin => {
            log.warn(format!(
                "{kind} '{name}' is provided by more than one plugin; keeping the first"
            ));
        }
        _ => {
            map.insert(name, item);
        }
    }
}

fn read_skill(dir: &Path, scope: Scope, log: &mut ReadLog) -> Option<SkillRef> {
    let manifest = dir.join("SKILL.md");
    if !dir.is_dir() || !manifest.is_file() {
        return None;
    }
    let manifest_hash = match hash_file(&manifest) {
        Ok(Some(hash)) => hash,
        Ok(None) => return None,
        Err(e) => {
            log.skip_file(&manifest, format!("{e:#}"));
            return None;
        }
    };
    let description = read_text(&manifest, log).and_then(|text| match parse_frontmatter(&text) {
        Ok((fm, _)) => fm.description,
        Err(e) => {
            log.warn(format!("{}: {e}", manifest.display()));
            None
        }
    });
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Some(SkillRef {
        name,
        path: dir.to_path_buf(),
        scope,
        description,
        manifest_hash,
    })
}

/// Skill directories (containing `SKILL.md`) keyed by directory name.
pub(super) fn read_skills(
    config: &SourceConfig,
    scope: SyncScope,
    plugins: &[Plugin],
    log: &mut ReadLog,
) -> BTreeMap<String, SkillRef> {
    let mut skills = BTreeMap::new();
    for (origin, dir) in asset_dirs(config, scope, plugins, config.user_skills(), Plugin::skills_dir, "skills") {
        for child in children(&dir) {
            if let Some(skill) = read_skill(&child, origin, log) {
                insert_ranked(&mut skills, skill.name.clone(), skill, |s| s.scope, "Skill", log);
            }
        }
    }
    skills
}

fn read_agent(path: &Path, scope: Scope, log: &mut ReadLog) -> Option<AgentDef> {
    let text = read_text(path, log)?;
    let (fm, body) = match parse_frontmatter(&text) {
        Ok(parsed) => parsed,
        Err(e) => {
            log.skip_file(path, e);
            return None;
        }
    };
    let description = fm
        .description
        .or_else(|| first_paragraph_line(&body))
        .unwrap_or_default();
    Some(AgentDef {
        name: stem(path),
        path: path.to_path_buf(),
        scope,
        description,
        tools: fm.tools.map(|t| t.into_vec()).unwrap_or_default(),
        instructions: extract_role(&body),
    })
}

/// Agent definitions keyed by file stem.
pub(super) fn read_agents(
    config: &SourceConfig,
    scope: SyncScope,
    plugins: &[Plugin],
    log: &mut ReadLog,
) -> BTreeMap<String, AgentDef> {
    let mut agents = BTreeMap::new();
    for (origin, dir) in asset_dirs(config, scope, plugins, config.user_agents(), Plugin::agents_dir, "agents") {
        for file in markdown_files(&dir) {
            if let Some(agent) = read_agent(&file, origin, log) {
                insert_ranked(&mut agents, agent.name.clone(), agent, |a| a.scope, "Agent", log);
            }
        }
    }
    agents
}

fn read_command(path: &Path, scope: Scope, log: &mut ReadLog) -> Option<CommandDef> {
    let text = read_text(path, log)?;
    let (fm, body) = match parse_frontmatter(&text) {
        Ok(parsed) => parsed,
        Err(e) => {
            log.skip_file(path, e);
            return None;
        }
    };
    Some(CommandDef {
        name: stem(path),
        path: path.to_path_buf(),
        scope,
        description: fm
            .description
            .or_else(|| first_paragraph_line(&body))
            .unwrap_or_default(),
        argument_hint: fm.argument_hint,
        body,
    })
}

/// Slash commands keyed by trigger name.
pub(super) fn read_commands(
    config: &SourceConfig,
    scope: SyncScope,
    plugins: &[Plugin],
    log: &mut ReadLog,
) -> BTreeMap<String, CommandDef> {
    let mut commands = BTreeMap::new();
    for (origin, dir) in asset_dirs(config, scope, plugins, config.user_commands(), Plugin::commands_dir, "commands") {
        for file in markdown_files(&dir) {
            if let Some(command) = read_command(&file, origin, log) {
                insert_ranked(&mut commands, command.name.clone(), command, |c| c.scope, "Command", log);
            }
        }
    }
    commands
}
