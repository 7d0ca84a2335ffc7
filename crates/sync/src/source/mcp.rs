//! MCP server discovery across `~/.claude.json`, `.mcp.json` and plugins.

use super::plugins::Plugin;
use super::{read_json, ReadLog, SourceConfig};
use crate::common::{McpServer, McpTransport, Scope, SyncScope};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

fn string_map(value: Option<&Value>) -> BTreeMap<String, String> {
    let Some(Value::Object(map)) = value else {
        return BTreeMap::new();
    };
    map.iter()
        .map(|(k, v)| {
            let v = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), v)
        })
        .collect()
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn is_sse_url(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.trim_end_matches('/').ends_with("/sse")
}

/// Interprets one descriptor. `Err` carries the reason it was rejected.
pub(crate) fn parse_transport(descriptor: &Value) -> Result<McpTransport, String> {
    let Value::Object(obj) = descriptor else {
        return Err("descriptor is not an object".into());
    };
    let command = obj.get("command").and_then(Value::as_str);
    let url = obj.get("url").and_then(Value::as_str);
    let stdio = |command: &str| McpTransport::Stdio {
        command: command.to_string(),
        args: string_list(obj.get("args")),
        env: string_map(obj.get("env")),
    };
    let headers = || string_map(obj.get("headers"));

    match obj.get("type").and_then(Value::as_str) {
        Some("stdio") => command.map(stdio).ok_or_else(|| "stdio server has no command".into()),
        Some("http") | Some("streamable-http") => url
            .map(|url| McpTransport::Http {
                url: url.to_string(),
                headers: headers(),
            })
            .ok_or_else(|| "http server has no url".into()),
        Some("sse") => url
            .map(|url| McpTransport::Sse {
                url: url.to_string(),
                headers: headers(),
            })
            .ok_or_else(|| "sse server has no url".into()),
        Some(other) => Err(format!("unknown transport type '{other}'")),
        None => match (command, url) {
            (Some(command), _) => Ok(stdio(command)),
            (None, Some(url)) if is_sse_url(url) => Ok(McpTransport::Sse {
                url: url.to_string(),
                headers: headers(),
            }),
            (None, Some(url)) => Ok(McpTransport::Http {
                url: url.to_string(),
                headers: headers(),
            }),
            (None, None) => Err("neither command nor url is set".into()),
        },
    }
}

/// Descriptors found in one registry file.
struct Found {
    scope: Scope,
    plugin: Option<String>,
    source: std::path::PathBuf,
    servers: Map<String, Value>,
}

fn servers_in(value: &Value) -> Map<String, Value> {
    match value.get("mcpServers") {
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    }
}

fn user_and_local(config: &SourceConfig, scope: SyncScope, log: &mut ReadLog) -> Vec<Found> {
    let path = config.user_mcp();
    let wants_user = scope.includes(Scope::User);
    let wants_local = scope.includes(Scope::Local) && config.project().is_some();
    if !wants_user && !wants_local {
        return Vec::new();
    }
    let Some(doc) = read_json(&path, log) else {
        return Vec::new();
    };

    let mut found = Vec::new();
    if wants_user {
        found.push(Found {
            scope: Scope::User,
            plugin: None,
            source: path.clone(),
            servers: servers_in(&doc),
        });
    }
    if let (true, Some(project)) = (wants_local, config.project()) {
        if let Some(entry) = local_entry(&doc, project) {
            found.push(Found {
                scope: Scope::Local,
                plugin: None,
                source: path.clone(),
                servers: servers_in(entry),
            });
        }
    }
    found
}

/// `projects[<project>]`, matching the path as given or canonicalized.
fn local_entry<'a>(doc: &'a Value, project: &Path) -> Option<&'a Value> {
    let projects = doc.get("projects")?.as_object()?;
    let direct = project.to_string_lossy();
    projects.get(direct.as_ref()).or_else(|| {
        let canonical = project.canonicalize().ok()?;
        projects.get(canonical.to_string_lossy().as_ref())
    })
}

fn project_file(config: &SourceConfig, scope: SyncScope, log: &mut ReadLog) -> Option<Found> {
    if !scope.includes(Scope::Project) {
        return None;
    }
    let path = config.project_mcp()?;
    let doc = read_json(&path, log)?;
    Some(Found {
        scope: Scope::Project,
        plugin: None,
        servers: servers_in(&doc),
        source: path,
    })
}

fn plugin_files(plugin: &Plugin, log: &mut ReadLog) -> Vec<Found> {
    let mut found = Vec::new();
    for (i, path) in plugin.mcp_files().into_iter().enumerate() {
        let Some(doc) = read_json(&path, log) else {
            continue;
        };
        // `.mcp.json` may hold the server map directly.
        let servers = match (i, doc.get("mcpServers")) {
            (_, Some(Value::Object(map))) => map.clone(),
            (0, _) => doc.as_object().cloned().unwrap_or_default(),
            _ => Map::new(),
        };
        let mut servers = Value::Object(servers);
        plugin.expand_root(&mut servers);
        found.push(Found {
            scope: Scope::Plugin,
            plugin: Some(plugin.name.clone()),
            source: path,
            servers: match servers {
                Value::Object(map) => map,
                _ => Map::new(),
            },
        });
    }
    found
}

/// Every server of `scope`, with precedence local > project > user > plugin.
pub(super) fn read_servers(
    config: &SourceConfig,
    scope: SyncScope,
    plugins: &[Plugin],
    log: &mut ReadLog,
) -> BTreeMap<String, McpServer> {
    let mut sources: Vec<Found> = Vec::new();
    for plugin in plugins {
        sources.extend(plugin_files(plugin, log));
    }
    sources.extend(user_and_local(config, scope, log));
    sources.extend(project_file(config, scope, log));

    let mut servers: BTreeMap<String, McpServer> = BTreeMap::new();
    for found in sources {
        for (name, descriptor) in &found.servers {
            let transport = match parse_transport(descriptor) {
                Ok(t) => t,
                Err(reason) => {
                    log.warn(format!(
                        "MCP server '{name}' in {} skipped: {reason}",
                        found.source.display()
                    ));
                    continue;
                }
            };
            match servers.get(name) {
                Some(existing) if existing.scope > found.scope => continue,
                Some(existing) if existing.scope == Scope::Plugin && found.scope == Scope::Plugin => {
                    log.warn(format!(
                        "MCP server '{name}' is provided by plugins {} and {}; keeping {}",
                        existing.plugin.as_deref().unwrap_or("?"),
                        found.plugin.as_deref().unwrap_or("?"),
                        existing.plugin.as_deref().unwrap_or("?"),
                    ));
                    continue;
                }
                _ => {}
            }
            servers.insert(
                name.clone(),
                McpServer {
                    name: name.clone(),
                    transport,
                    scope: found.scope,
                    plugin: found.plugin.clone(),
                    source: found.source.clone(),
                },
            );
        }
    }
    servers
}
