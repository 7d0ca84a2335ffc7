//! `[mcp_servers.<name>]` tables in Codex's `config.toml`.
//!
//! Codex performs no `${VAR}` interpolation, so environment references are
//! rewritten into literal values or the `env_vars` pass-through whitelist.

use super::paths::CodexPaths;
use crate::adapters::env_vars::{exact_placeholder, has_placeholders, source_effective, translate_for_codex, EnvMap};
use crate::adapters::traits::SyncContext;
use crate::adapters::utils::{read_optional, write_if_changed};
use crate::common::{item_id, stale_items, McpServer, McpTransport, TargetLevel, TransportKind};
use crate::error::SyncError;
use crate::report::{SkipReason, SyncResult};
use crate::Result;
use anyhow::Context;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use toml::{Table, Value};
use tracing::warn;

/// Parses `config.toml` for editing. Missing or empty means an empty table.
pub(super) fn read_table(path: &Path) -> Result<Table> {
    let text = read_optional(path)?;
    if text.trim().is_empty() {
        return Ok(Table::new());
    }
    text.parse::<Table>()
        .with_context(|| format!("Refusing to rewrite malformed TOML in {}", path.display()))
}

pub(super) fn write_table(path: &Path, table: &Table) -> Result<bool> {
    let text = toml::to_string_pretty(table)
        .with_context(|| format!("Failed to serialize {}", path.display()))?;
    write_if_changed(path, &text)
}

fn string(value: impl Into<String>) -> Value {
    Value::String(value.into())
}

fn string_table(map: BTreeMap<String, String>) -> Value {
    Value::Table(map.into_iter().map(|(k, v)| (k, string(v))).collect())
}

/// A translated server entry.
struct Entry {
    table: Table,
    adapted: bool,
    warnings: Vec<String>,
}

fn resolve(server: &str, field: &str, value: &str, env: &EnvMap) -> std::result::Result<String, SyncError> {
    source_effective(value, env).ok_or_else(|| {
        SyncError::translation("codex", server, format!("{field} references an unset variable"))
    })
}

fn server_entry(server: &McpServer, env: &EnvMap) -> std::result::Result<Entry, SyncError> {
    let mut table = Table::new();
    let mut adapted = false;
    let mut warnings = Vec::new();
    match &server.transport {
        McpTransport::Stdio {
            command,
            args,
            env: source_env,
        } => {
            adapted |= has_placeholders(command) || args.iter().any(|a| has_placeholders(a));
            table.insert("command".into(), string(resolve(&server.name, "command", command, env)?));
            if !args.is_empty() {
                let args = args
                    .iter()
                    .map(|a| resolve(&server.name, "args", a, env).map(string))
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                table.insert("args".into(), Value::Array(args));
            }
            let codex = translate_for_codex(&server.name, source_env, env);
            adapted |= source_env.values().any(|v| has_placeholders(v));
            warnings.extend(codex.warnings);
            if !codex.env.is_empty() {
                table.insert("env".into(), string_table(codex.env));
            }
            if !codex.env_vars.is_empty() {
                table.insert(
                    "env_vars".into(),
                    Value::Array(codex.env_vars.into_iter().map(string).collect()),
                );
            }
        }
        McpTransport::Http { url, headers } => {
            adapted |= has_placeholders(url);
            table.insert("url".into(), string(resolve(&server.name, "url", url, env)?));
            let mut literal = BTreeMap::new();
            let mut from_env = BTreeMap::new();
            for (name, value) in headers {
                if name.eq_ignore_ascii_case("authorization") {
                    if let Some((var, None)) = value
                        .strip_prefix("Bearer ")
                        .and_then(exact_placeholder)
                    {
                        table.insert("bearer_token_env_var".into(), string(var));
                        adapted = true;
                        continue;
                    }
                }
                if let Some((var, None)) = exact_placeholder(value) {
                    from_env.insert(name.clone(), var.to_string());
                    adapted = true;
                    continue;
                }
                match source_effective(value, env) {
                    Some(resolved) => {
                        adapted |= has_placeholders(value);
                        literal.insert(name.clone(), resolved);
                    }
                    None => warnings.push(format!(
                        "MCP server '{}': header {name} dropped, its variable is not set",
                        server.name
                    )),
                }
            }
            if !literal.is_empty() {
                table.insert("http_headers".into(), string_table(literal));
            }
            if !from_env.is_empty() {
                table.insert("env_http_headers".into(), string_table(from_env));
            }
        }
        McpTransport::Sse { .. } => {
            return Err(SyncError::translation(
                "codex",
                &server.name,
                "Codex cannot connect to SSE servers",
            ))
        }
    }
    Ok(Entry {
        table,
        adapted,
        warnings,
    })
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
        let id = item_id("mcp", level, &server.name);
        if !supported.contains(&server.kind()) {
            warn!(server = %server.name, transport = %server.kind(), "Skipping MCP server unsupported by codex");
            result.skip(SkipReason::UnsupportedTransport {
                server: server.name.clone(),
                transport: server.kind(),
                target: "codex".into(),
            });
            continue;
        }
        if level == TargetLevel::Project && ctx.project_dir().is_none() {
            result.skip(SkipReason::NoProjectDir { item: id });
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
        let Some(paths) = CodexPaths::for_level(level, home, ctx.project_dir()) else {
            continue;
        };
        let servers = by_level.remove(&level).unwrap_or_default();
        let stale = stale.remove(&level).unwrap_or_default();
        sync_level(&paths.config_toml, level, &servers, &stale, ctx, &mut result)?;
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
    let mut table = read_table(path)?;
    let mut mcp = match table.remove("mcp_servers") {
        Some(Value::Table(t)) => t,
        Some(_) => anyhow::bail!("`mcp_servers` in {} is not a table", path.display()),
        None => Table::new(),
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
        let entry = match server_entry(server, &ctx.env) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(server = %server.name, error = %err, "MCP server not representable in codex");
                let reason = match err {
                    SyncError::Translation { reason, .. } => reason,
                    other => other.to_string(),
                };
                result.skip(SkipReason::NotRepresentable { item: id, reason });
                continue;
            }
        };
        result.warnings.extend(entry.warnings);
        let value = Value::Table(entry.table);
        if mcp.get(&server.name) == Some(&value) {
            result.skip(SkipReason::Unchanged { item: id.clone() });
        } else {
            mcp.insert(server.name.clone(), value);
            changed = true;
            result.synced += 1;
            if entry.adapted {
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
        table.insert("mcp_servers".into(), Value::Table(mcp));
    }
    if changed {
        write_table(path, &table)?;
    }
    if !servers.is_empty() {
        result.files.push(path.to_path_buf());
    }
    Ok(())
}
