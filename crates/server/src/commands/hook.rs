//! PostToolUse hook: sync when Claude Code edits one of its own config files.
//!
//! The hook must never block the tool call, so every outcome (bad input,
//! debounce, contention, sync errors) ends in `Ok(())` and exit status 0.

use super::orchestrator;
use anyhow::Result;
use hsync_state::{load_settings, profile, state_root, StateManager};
use hsync_sync::{SourceConfig, SyncParams, SyncScope, TargetStatus};
use serde::Deserialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Files directly inside `~/.claude` or `<project>/.claude` that feed a sync.
const CONFIG_FILES: &[&str] = &["CLAUDE.md", "settings.json", "settings.local.json"];
/// Directories inside those roots whose contents feed a sync.
const CONFIG_DIRS: &[&str] = &["skills", "agents", "commands", "plugins"];
/// Project-root files read as Claude configuration.
const PROJECT_FILES: &[&str] = &["CLAUDE.md", "CLAUDE.local.md", ".mcp.json"];

#[derive(Debug, Default, Deserialize)]
struct HookEvent {
    #[serde(default)]
    tool_input: ToolInput,
}

#[derive(Debug, Default, Deserialize)]
struct ToolInput {
    #[serde(default)]
    file_path: Option<String>,
}

/// File path the tool wrote, if the event carries one.
pub(crate) fn edited_path(input: &str) -> Option<String> {
    let event: HookEvent = serde_json::from_str(input).ok()?;
    event.tool_input.file_path.filter(|p| !p.is_empty())
}

fn in_config_dir(path: &Path, dir: &Path) -> bool {
    let Ok(rel) = path.strip_prefix(dir) else {
        return false;
    };
    let mut parts = rel.components();
    let Some(first) = parts.next().map(|c| c.as_os_str()) else {
        return false;
    };
    if parts.next().is_some() {
        CONFIG_DIRS.iter().any(|d| first == *d)
    } else {
        CONFIG_FILES.iter().any(|f| first == *f)
    }
}

/// True when `path` is Claude configuration this user or project syncs from.
///
/// Matching is anchored at the Claude roots, so `skills/` or `settings.json`
/// elsewhere on disk does not trigger a sync. Relative paths are taken from
/// the project directory.
pub(crate) fn is_config_path(path: &Path, source: &SourceConfig) -> bool {
    let path = match (path.is_relative(), source.project()) {
        (true, Some(project)) => project.join(path),
        _ => path.to_path_buf(),
    };
    if in_config_dir(&path, &source.claude_home) || path == source.user_mcp() {
        return true;
    }
    let Some(project) = source.project() else {
        return false;
    };
    in_config_dir(&path, &project.join(".claude"))
        || PROJECT_FILES.iter().any(|f| path == project.join(f))
}

/// Handle the `hook` command.
pub(crate) fn handle_hook_command(project_dir: Option<PathBuf>) -> Result<()> {
    let mut input = String::new();
    if let Err(e) = std::io::stdin().read_to_string(&mut input) {
        debug!(error = %e, "Cannot read hook input");
        return Ok(());
    }
    let Some(path) = edited_path(&input) else {
        return Ok(());
    };
    let source = match SourceConfig::from_env(project_dir.clone()) {
        Ok(source) => source,
        Err(e) => {
            debug!(error = %format!("{e:#}"), "Cannot resolve Claude config roots");
            return Ok(());
        }
    };
    if !is_config_path(Path::new(&path), &source) {
        return Ok(());
    }
    eprintln!("hsync: config change detected: {path}");
    if let Err(e) = sync_from_hook(project_dir) {
        warn!(error = %format!("{e:#}"), "Hook sync failed");
        eprintln!("hsync: sync error: {e:#}");
    }
    Ok(())
}

fn sync_from_hook(project_dir: Option<PathBuf>) -> Result<()> {
    let settings = load_settings()?;
    let state = StateManager::open(&state_root()?, &profile())?;
    if state.should_debounce(settings.debounce()) {
        eprintln!("hsync: sync skipped (debounce)");
        return Ok(());
    }

    let params = SyncParams {
        scope: SyncScope::All,
        targets: settings.targets.clone(),
        allow_secrets: settings.allow_secrets(),
        parallel: settings.parallel(),
        ..Default::default()
    };
    let report = orchestrator(project_dir)?.sync(&params)?;
    let busy = report
        .targets
        .iter()
        .filter(|t| t.status == TargetStatus::Busy)
        .count();
    if busy > 0 {
        eprintln!("hsync: {busy} target(s) busy, sync in progress elsewhere");
    }
    eprintln!(
        "hsync: synced {} target(s){}",
        report.targets.len() - busy,
        if report.success { "" } else { " with errors" }
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> SourceConfig {
        SourceConfig {
            claude_home: PathBuf::from("/h/.claude"),
            home: PathBuf::from("/h"),
            project_dir: Some(PathBuf::from("/p")),
        }
    }

    fn matches(path: &str) -> bool {
        is_config_path(Path::new(path), &source())
    }

    #[test]
    fn config_paths_under_claude_roots_match() {
        assert!(matches("/p/CLAUDE.md"));
        assert!(matches("/p/CLAUDE.local.md"));
        assert!(matches("/p/.mcp.json"));
        assert!(matches("/p/.claude/settings.local.json"));
        assert!(matches("/p/.claude/commands/deploy.md"));
        assert!(matches("/h/.claude/skills/review/SKILL.md"));
        assert!(matches("/h/.claude/settings.json"));
        assert!(matches("/h/.claude.json"));
        assert!(matches(".claude/agents/reviewer.md"));
    }

    #[test]
    fn lookalike_paths_elsewhere_do_not_match() {
        assert!(!matches("/tmp/other/skills/x.md"));
        assert!(!matches("/p/src/skills/loader.rs"));
        assert!(!matches("/p/docs/CLAUDE.md"));
        assert!(!matches("/p/frontend/settings.json"));
        assert!(!matches("/h/.claude/skills"));
        assert!(!matches("/h/.claude/notes.md"));
        assert!(!matches("/p/src/main.rs"));
        assert!(!matches(""));
    }

    #[test]
    fn project_paths_need_a_project() {
        let user_only = SourceConfig {
            project_dir: None,
            ..source()
        };
        assert!(!is_config_path(Path::new("/p/CLAUDE.md"), &user_only));
        assert!(is_config_path(Path::new("/h/.claude/CLAUDE.md"), &user_only));
    }

    #[test]
    fn edited_path_reads_tool_input() {
        let input = r#"{"tool_name":"Write","tool_input":{"file_path":"/p/CLAUDE.md","content":"x"}}"#;
        assert_eq!(edited_path(input).as_deref(), Some("/p/CLAUDE.md"));
    }

    #[test]
    fn malformed_or_pathless_events_are_ignored() {
        assert_eq!(edited_path("not json"), None);
        assert_eq!(edited_path(r#"{"tool_name":"Bash","tool_input":{"command":"ls"}}"#), None);
        assert_eq!(edited_path(r#"{"tool_input":{"file_path":""}}"#), None);
    }
}
