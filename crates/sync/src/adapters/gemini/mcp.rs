//! `mcpServers` in Gemini's `settings.json`.
//!
//! Gemini interpolates `${VAR}` itself, so references are kept verbatim;
//! only the `${VAR:-default}` form, which Gemini does not understand, is
//! resolved at sync time.

use super::paths::GeminiPaths;
use crate::adapters::env_vars::{resolve_defaults, EnvMap};
use crate::adapters::traits::SyncContext;
use crate::adapters::utils::{read_json_object, write_json_object};
use crate::common::{item_id, stale_items, McpServer, McpTransport, TargetLevel, TransportKind};
use crate::report::{SkipReason, SyncResult};
use crate::Result;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::warn;

struct Rewriter<'a> {
    env: &'a EnvMap,
    adapted: bool,
}

impl Rewriter<'_> {
    fn value(&mut self, value: &str) -> Value {
        let (out, changed) = resolve_defaults(value, self.env);
        self.adapted |= changed;
        Value::String(out)
    }

    fn map(&mut self, map: &BTreeMap<String, String>) -> Value {
        Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), self.value(v)))
                .collect(),
        )
    }
}

/// Gemini's JSON entry for one server, plus whether anything was rewritten.
pub(super) fn server_entry(server: &McpServer, env: &EnvMap) -> (Value, bool) {
    let mut rw = Rewriter {
        env,
        adapted: false,
    };
    let mut entry = Map::new();
    match &server.transport {
        McpTransport::Stdio {
            command,
            args,
            env: vars,
        } => {
            entry.insert("command".into(), rw.value(command));
            if !args.is_empty() {
                let args = args.iter().map(|a| rw.value(a)).collect();
                entry.insert("args".into(), Value::Array(args));
            }
            if !vars.is_empty() {
                entry.insert("env".into(), rw.map(vars));
            }
        }
        McpTransport::Sse { url, headers } => {
            entry.insert("url".into(), rw.value(url));
            if !headers.is_empty() {
                entry.insert("headers".into(), rw.map(headers));
            }
        }
        McpTransport::Http { url, headers } => {
            entry.insert("httpUrl".into(), rw.value(url));
            if !headers.is_empty() {
                entry.insert("headers".into(), rw.map(headers));
            }
        }
    }
    (Value::Object(entry), rw.adapted)
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
            warn!(server = %server.name, transport = %server.kind(), "Skipping MCP server unsupported by gemini");
            result.skip(SkipReason::UnsupportedTransport {
                server: server.name.clone(),
                transport: server.kind(),
                target: "gemini".into(),
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
        let Some(paths) = GeminiPaths::for_level(level, home, ctx.project_dir()) else {
            continue;
        };
        let servers = by_level.remove(&level).unwrap_or_default();
        let stale = stale.remove(&level).unwrap_or_default();
        sync_level(&paths.settings, level, &servers, &stale, ctx, &mut result)?;
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
    let mut settings = read_json_object(path)?;
    let mut mcp = match settings.remove("mcpServers") {
        Some(Value::Object(map)) => map,
        Some(_) => anyhow::bail!("`mcpServers` in {} is not an object", path.display()),
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
        let (entry, adapted) = server_entry(server, &ctx.env);
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
        settings.insert("mcpServers".into(), Value::Object(mcp));
    }
    if changed {
        write_json_object(path, settings)?;
    }
    if !servers.is_empty() {
        result.files.push(path.to_path_buf());
    }
    Ok(())
}
