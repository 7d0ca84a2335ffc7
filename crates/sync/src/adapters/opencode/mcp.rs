//! The `mcp` section of `opencode.json`.

use super::paths::OpenCodePaths;
use crate::adapters::env_vars::{to_opencode, EnvMap};
use crate::adapters::traits::SyncContext;
use crate::adapters::utils::{read_json_object, write_json_object};
use crate::common::{item_id, stale_items, McpServer, McpTransport, TargetLevel, TransportKind};
use crate::report::{SkipReason, SyncResult};
use crate::Result;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::warn;

pub(super) const SCHEMA_URL: &str = "https://opencode.ai/config.json";

/// Adds `$schema` to a config hsync is about to create or edit.
pub(super) fn ensure_schema(config: &mut Map<String, Value>) {
    config
        .entry("$schema")
        .or_insert_with(|| Value::String(SCHEMA_URL.into()));
}

/// OpenCode entry for one server: `type: local` with a command array, or
/// `type: remote` with a URL. `${VAR}` becomes `{env:VAR}`.
pub(super) fn server_entry(server: &McpServer, env: &EnvMap) -> Option<(Value, bool)> {
    let mut adapted = false;
    let mut rewrite = |value: &str| {
        let (out, changed) = to_opencode(value, env);
        adapted |= changed || out != value;
        Value::String(out)
    };
    let mut entry = Map::new();
    match &server.transport {
        McpTransport::Stdio {
            command,
            args,
            env: vars,
        } => {
            entry.insert("type".into(), "local".into());
            let argv = std::iter::once(command).chain(args).map(|a| rewrite(a)).collect();
            entry.insert("command".into(), Value::Array(argv));
            if !vars.is_empty() {
                let environment = vars.iter().map(|(k, v)| (k.clone(), rewrite(v))).collect();
                entry.insert("environment".into(), Value::Object(environment));
            }
        }
        McpTransport::Http { url, headers } => {
            entry.insert("type".into(), "remote".into());
            entry.insert("url".into(), rewrite(url));
            if !headers.is_empty() {
                let headers = headers.iter().map(|(k, v)| (k.clone(), rewrite(v))).collect();
                entry.insert("headers".into(), Value::Object(headers));
            }
        }
        McpTransport::Sse { .. } => return None,
    }
    entry.insert("enabled".into(), Value::Bool(true));
    Some((Value::Object(entry), adapted))
}

pub fn sync_mcp(
    home: &Path,
    servers: &BTreeMap<String, McpServer>,
    ctx: &SyncContext,
    supported: &[TransportKind],
) -> Result<SyncResult> {
    let mut result = SyncResult::default();
    let mut by_level: BTreeMap<TargetLevel, Vec<&McpServer>> = BTreeMap::new();
    for server in servers.values() {
        let level = server.scope.mcp_level();
        if !supported.contains(&server.kind()) {
            warn!(server = %server.name, transport = %server.kind(), "Skipping MCP server unsupported by opencode");
            result.skip(SkipReason::UnsupportedTransport {
                server: server.name.clone(),
                transport: server.kind(),
                target: "opencode".into(),
            });
            continue;
        }
        if level == TargetLevel::Project && ctx.project_dir().is_none() {
            result.skip(SkipReason::NoProjectDir {
                item: item_id("mcp", level, &server.name),
            });
            continue;
        }
        by_level.entry(level).or_default().push(server);
    }

    let current: BTreeSet<String> = by_level
        .iter()
        .flat_map(|(level, list)| list.iter().map(move |s| item_id("mcp", *level, &s.name)))
        .collect();
    let mut stale: BTreeMap<TargetLevel, Vec<&str>> = BTreeMap::new();
    for (level, name) in stale_items(&ctx.previous_items, &current, "mcp") {
        stale.entry(level).or_default().push(name);
    }

    let levels: BTreeSet<TargetLevel> = by_level.keys().chain(stale.keys()).copied().collect();
    for level in levels {
        let Some(paths) = OpenCodePaths::for_level(level, home, ctx.project_dir()) else {
            continue;
        };
        let servers = by_level.remove(&level).unwrap_or_default();
        let stale = stale.remove(&level).unwrap_or_default();
        sync_level(&paths.config, level, &servers, &stale, ctx, &mut result)?;
    }
    Ok(result)
}

fn sync_level(
    path: &Path,
    level: TargetLevel,
    servers: &[&McpServer],
    stale: &[&str],
    ctx: &SyncContext,
    result: &mut SyncResult,
) -> Result<()> {
    let mut config = read_json_object(path)?;
    let mut mcp = match config.remove("mcp") {
        Some(Value::Object(map)) => map,
        Some(_) => anyhow::bail!("`mcp` in {} is not an object", path.display()),
        None => Map::new(),
    };
    let mut changed = false;

    for server in servers {
        let id = item_id("mcp", level, &server.name);
        if mcp.contains_key(&server.name) && !ctx.was_managed(&id) {
            result.skip(SkipReason::Unmanaged {
                item: id,
                path: path.to_path_buf(),
            });
            continue;
        }
        let Some((entry, adapted)) = server_entry(server, &ctx.env) else {
            continue;
        };
        if mcp.get(&server.name) == Some(&entry) {
            result.skip(SkipReason::Unchanged { item: id.clone() });
        } else {
            mcp.insert(server.name.clone(), entry);
            changed = true;
            result.synced += 1;
            if adapted {
                result.adapted += 1;
            }
        }
        result.track(id);
    }

    for name in stale {
        if mcp.remove(*name).is_some() {
            changed = true;
            result.removed.push(item_id("mcp", level, name));
        }
    }

    if !mcp.is_empty() {
        config.insert("mcp".into(), Value::Object(mcp));
    }
    if changed {
        ensure_schema(&mut config);
        write_json_object(path, config)?;
    }
    if !servers.is_empty() {
        result.files.push(path.to_path_buf());
    }
    Ok(())
}
