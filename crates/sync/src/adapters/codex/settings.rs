//! Permission and environment settings mapped onto Codex's coarse policy keys.

use super::mcp::{read_table, write_table};
use super::paths::CodexPaths;
use crate::adapters::traits::SyncContext;
use crate::common::{item_id, stale_items, Permissions, Settings};
use crate::report::{SkipReason, SyncResult};
use crate::Result;
use std::collections::BTreeSet;
use std::path::Path;
use toml::{Table, Value};

const SHELL_POLICY: &str = "shell_environment_policy";

/// `(sandbox_mode, approval_policy)` for a permission set.
///
/// Any denial forces the read-only sandbox; write access is granted only when
/// the source already auto-accepts edits.
pub fn codex_policy(perms: &Permissions) -> (&'static str, &'static str) {
    if !perms.deny.is_empty() {
        return ("read-only", "on-request");
    }
    match perms.default_mode.as_deref() {
        Some("bypassPermissions") => ("workspace-write", "on-failure"),
        Some("acceptEdits") => ("workspace-write", "on-request"),
        _ => ("read-only", "on-request"),
    }
}

fn apply(table: &mut Table, settings: &Settings, result: &mut SyncResult) -> Result<()> {
    let perms = &settings.permissions;
    if !perms.is_empty() {
        let (sandbox, approval) = codex_policy(perms);
        table.insert("sandbox_mode".into(), Value::String(sandbox.into()));
        table.insert("approval_policy".into(), Value::String(approval.into()));
        let per_tool = perms.allow.len() + perms.deny.len() + perms.ask.len();
        if per_tool > 0 {
            result.warn(format!(
                "codex: {per_tool} per-tool permission rules collapsed into sandbox_mode = \"{sandbox}\""
            ));
        }
    }
    if !settings.env.is_empty() {
        let policy = table
            .entry(SHELL_POLICY)
            .or_insert_with(|| Value::Table(Table::new()));
        let Value::Table(policy) = policy else {
            anyhow::bail!("`{SHELL_POLICY}` in config.toml is not a table");
        };
        let set = settings
            .env
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        policy.insert("set".into(), Value::Table(set));
    }
    Ok(())
}

/// Removes every key hsync manages from a previously synced config.
fn clear(table: &mut Table) {
    table.remove("sandbox_mode");
    table.remove("approval_policy");
    let now_empty = match table.get_mut(SHELL_POLICY) {
        Some(Value::Table(policy)) => {
            policy.remove("set");
            policy.is_empty()
        }
        _ => false,
    };
    if now_empty {
        table.remove(SHELL_POLICY);
    }
}

pub fn sync_settings(home: &Path, settings: &Settings, ctx: &SyncContext) -> Result<SyncResult> {
    let mut result = SyncResult::default();
    let level = settings.level();
    let id = item_id("settings", level, "config");
    let current: BTreeSet<String> = if settings.is_empty() {
        BTreeSet::new()
    } else {
        BTreeSet::from([id.clone()])
    };

    for (stale_level, name) in stale_items(&ctx.previous_items, &current, "settings") {
        let Some(paths) = CodexPaths::for_level(stale_level, home, ctx.project_dir()) else {
            continue;
        };
        if !paths.config_toml.is_file() {
            continue;
        }
        let mut table = read_table(&paths.config_toml)?;
        clear(&mut table);
        write_table(&paths.config_toml, &table)?;
        result.removed.push(item_id("settings", stale_level, name));
    }

    if settings.is_empty() {
        return Ok(result);
    }
    let Some(paths) = CodexPaths::for_level(level, home, ctx.project_dir()) else {
        result.skip(SkipReason::NoProjectDir { item: id });
        return Ok(result);
    };

    let mut table = read_table(&paths.config_toml)?;
    let before = table.clone();
    apply(&mut table, settings, &mut result)?;
    if table != before && write_table(&paths.config_toml, &table)? {
        result.synced += 1;
        result.adapted += 1;
    } else {
        result.skip(SkipReason::Unchanged { item: id.clone() });
    }
    result.files.push(paths.config_toml);
    result.track(id);
    Ok(result)
}
