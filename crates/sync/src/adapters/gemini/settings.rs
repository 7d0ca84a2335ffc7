//! Tool permissions mapped onto Gemini's `tools.allowed` / `tools.exclude` lists.

use super::paths::GeminiPaths;
use crate::adapters::traits::SyncContext;
use crate::adapters::utils::{read_json_object, write_json_object};
use crate::common::{item_id, parse_item_id, Permissions, Settings, TargetLevel};
use crate::report::{SkipReason, SyncResult};
use crate::Result;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::path::Path;

/// Gemini name of a bare Claude tool.
fn gemini_tool(claude: &str) -> Option<&'static str> {
    Some(match claude {
        "Bash" => "run_shell_command",
        "Read" => "read_file",
        "Write" => "write_file",
        "Edit" | "MultiEdit" => "replace",
        "Glob" => "glob",
        "Grep" => "search_file_content",
        "WebFetch" => "web_fetch",
        "WebSearch" => "google_web_search",
        "LS" => "list_directory",
        _ => return None,
    })
}

/// How a list entry is treated when it cannot be mapped exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    Allow,
    Deny,
}

/// Maps one Claude permission rule (`Read`, `Bash(git:*)`, `Read(./src/**)`).
///
/// `Bash(cmd:*)` keeps its command prefix. Other argument patterns cannot be
/// expressed: a deny rule widens to the whole tool, an allow rule is dropped.
/// Unknown tools pass through on deny lists and are dropped on allow lists.
pub fn map_rule(rule: &str, list: ListKind) -> Option<String> {
    let (tool, arg) = match rule.split_once('(') {
        Some((tool, rest)) => (tool.trim(), rest.strip_suffix(')').map(str::trim)),
        None => (rule.trim(), None),
    };
    match (gemini_tool(tool), arg) {
        (Some("run_shell_command"), Some(arg)) => {
            let prefix = arg.trim_end_matches('*').trim_end_matches(':').trim();
            if prefix.is_empty() {
                Some("run_shell_command".into())
            } else {
                Some(format!("run_shell_command({prefix})"))
            }
        }
        (Some(mapped), None) => Some(mapped.into()),
        (Some(mapped), Some(_)) => (list == ListKind::Deny).then(|| mapped.into()),
        (None, _) => (list == ListKind::Deny).then(|| rule.to_string()),
    }
}

fn map_list(rules: &[String], list: ListKind, result: &mut SyncResult) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for rule in rules {
        match map_rule(rule, list) {
            Some(mapped) => {
                if !out.contains(&mapped) {
                    out.push(mapped);
                }
            }
            None => result.warn(format!("gemini: allow rule '{rule}' has no equivalent and was dropped")),
        }
    }
    out
}

/// True when Gemini may skip every confirmation.
pub fn yolo_allowed(perms: &Permissions) -> bool {
    perms.requests_full_automation() && perms.deny.is_empty()
}

const ALLOWED: &str = "allowed";
const EXCLUDE: &str = "exclude";

/// Item kind under which hsync records the list entries it added.
fn entry_kind(key: &str) -> &'static str {
    match key {
        ALLOWED => "tool-allowed",
        EXCLUDE => "tool-exclude",
        _ => "tool-yolo",
    }
}

/// Names of `kind` entries hsync held at `level` after the previous sync.
fn owned_before(ctx: &SyncContext, kind: &str, level: TargetLevel) -> BTreeSet<String> {
    ctx.previous_items
        .iter()
        .filter_map(|id| parse_item_id(id))
        .filter(|(k, l, _)| *k == kind && *l == level)
        .map(|(_, _, name)| name.to_string())
        .collect()
}

fn string_entries(tools: &Map<String, Value>, key: &str) -> Vec<String> {
    tools
        .get(key)
        .and_then(Value::as_array)
        .map(|list| list.iter().filter_map(Value::as_str).map(String::from).collect())
        .unwrap_or_default()
}

/// Merges `managed` into `tools.<key>`. Entries the user wrote are kept; only
/// entries hsync added earlier and no longer wants are dropped.
///
/// Returns the entries hsync owns afterwards.
fn merge_list(
    tools: &mut Map<String, Value>,
    key: &str,
    managed: &[String],
    owned: &BTreeSet<String>,
) -> Result<Vec<String>> {
    let mut list = match tools.get(key) {
        None => Vec::new(),
        Some(Value::Array(list)) => list.clone(),
        Some(_) => anyhow::bail!("`tools.{key}` in settings.json is not a list"),
    };
    list.retain(|v| {
        v.as_str()
            .is_none_or(|s| !owned.contains(s) || managed.iter().any(|m| m == s))
    });
    let mut now_owned = Vec::new();
    for entry in managed {
        if !list.iter().any(|v| v.as_str() == Some(entry.as_str())) {
            list.push(Value::String(entry.clone()));
            now_owned.push(entry.clone());
        } else if owned.contains(entry) {
            now_owned.push(entry.clone());
        }
    }
    if list.is_empty() {
        tools.remove(key);
    } else {
        tools.insert(key.into(), Value::Array(list));
    }
    Ok(now_owned)
}

/// Applies `perms` to one level's settings and returns the item ids hsync owns there.
fn apply(
    settings_json: &mut Map<String, Value>,
    perms: &Permissions,
    level: TargetLevel,
    ctx: &SyncContext,
    result: &mut SyncResult,
) -> Result<Vec<String>> {
    let tools = settings_json
        .entry("tools")
        .or_insert_with(|| Value::Object(Map::new()));
    let Value::Object(tools) = tools else {
        anyhow::bail!("`tools` in settings.json is not an object");
    };

    let owned_exclude = owned_before(ctx, entry_kind(EXCLUDE), level);
    let user_excluded: BTreeSet<String> = string_entries(tools, EXCLUDE)
        .into_iter()
        .filter(|e| !owned_exclude.contains(e))
        .collect();
    let excluded = map_list(&perms.deny, ListKind::Deny, result);
    let mut allowed = map_list(&perms.allow, ListKind::Allow, result);
    allowed.retain(|tool| {
        let blocked = user_excluded.contains(tool);
        if blocked {
            result.warn(format!(
                "gemini: '{tool}' stays excluded; settings.json already excludes it"
            ));
        }
        !blocked
    });

    let mut ids = Vec::new();
    for (key, managed) in [(ALLOWED, &allowed), (EXCLUDE, &excluded)] {
        let kind = entry_kind(key);
        let owned = owned_before(ctx, kind, level);
        for entry in merge_list(tools, key, managed, &owned)? {
            ids.push(item_id(kind, level, &entry));
        }
    }
    if tools.is_empty() {
        settings_json.remove("tools");
    }

    let yolo_id = item_id(entry_kind("yolo"), level, "yolo");
    let owns_yolo = ctx.was_managed(&yolo_id);
    let user_yolo = !owns_yolo && settings_json.contains_key("yolo");
    if yolo_allowed(perms) && !user_yolo {
        settings_json.insert("yolo".into(), Value::Bool(true));
        ids.push(yolo_id);
    } else if owns_yolo {
        settings_json.remove("yolo");
    }
    Ok(ids)
}

/// Levels where hsync owned list entries or the yolo flag after the previous sync.
fn previously_owned_levels(ctx: &SyncContext) -> BTreeSet<TargetLevel> {
    let kinds = [entry_kind(ALLOWED), entry_kind(EXCLUDE), entry_kind("yolo")];
    ctx.previous_items
        .iter()
        .filter_map(|id| parse_item_id(id))
        .filter(|(kind, _, _)| kinds.contains(kind))
        .map(|(_, level, _)| level)
        .collect()
}

pub fn sync_settings(home: &Path, settings: &Settings, ctx: &SyncContext) -> Result<SyncResult> {
    let mut result = SyncResult::default();
    let level = settings.level();
    let id = item_id("settings", level, "permissions");
    let has_perms = !settings.permissions.is_empty();

    if !settings.env.is_empty() {
        result.skip(SkipReason::NotRepresentable {
            item: "settings:env".into(),
            reason: "Gemini reads environment variables from .env files, not settings.json".into(),
        });
    }

    let mut levels = previously_owned_levels(ctx);
    if has_perms {
        levels.insert(level);
    }
    let empty = Permissions::default();
    for target_level in levels {
        let current = has_perms && target_level == level;
        let Some(paths) = GeminiPaths::for_level(target_level, home, ctx.project_dir()) else {
            if current {
                result.skip(SkipReason::NoProjectDir { item: id.clone() });
            }
            continue;
        };
        if !current && !paths.settings.is_file() {
            continue;
        }
        let perms = if current { &settings.permissions } else { &empty };
        let mut json = read_json_object(&paths.settings)?;
        let owned = apply(&mut json, perms, target_level, ctx, &mut result)?;
        let written = write_json_object(&paths.settings, json)?;
        if current {
            if written {
                result.synced += 1;
                result.adapted += 1;
            } else {
                result.skip(SkipReason::Unchanged { item: id.clone() });
            }
            result.files.push(paths.settings);
            result.track(id.clone());
            owned.into_iter().for_each(|owned_id| result.track(owned_id));
        } else {
            let stale = item_id("settings", target_level, "permissions");
            if ctx.was_managed(&stale) {
                result.removed.push(stale);
            }
        }
    }
    Ok(result)
}
