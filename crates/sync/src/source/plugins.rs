//! Installed plugin discovery from `~/.claude/plugins/installed_plugins.json`.

use super::settings::SettingsLayer;
use super::{read_json, ReadLog, SourceConfig};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::debug;

const PLUGIN_ROOT_VAR: &str = "${CLAUDE_PLUGIN_ROOT}";

/// An enabled, installed plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plugin {
    /// Registry key without the `@marketplace` suffix.
    pub name: String,
    /// Registry key as written, used for `enabledPlugins` lookups.
    pub key: String,
    pub root: PathBuf,
}

impl Plugin {
    pub fn skills_dir(&self) -> PathBuf {
        self.root.join("skills")
    }

    pub fn agents_dir(&self) -> PathBuf {
        self.root.join("agents")
    }

    pub fn commands_dir(&self) -> PathBuf {
        self.root.join("commands")
    }

    /// Files that may declare MCP servers, in lookup order.
    pub fn mcp_files(&self) -> [PathBuf; 3] {
        [
            self.root.join(".mcp.json"),
            self.root.join(".claude-plugin").join("plugin.json"),
            self.root.join("plugin.json"),
        ]
    }

    /// Replaces `${CLAUDE_PLUGIN_ROOT}` in every string of `value`.
    pub fn expand_root(&self, value: &mut Value) {
        let root = self.root.to_string_lossy();
        expand_in(value, &root);
    }
}

fn expand_in(value: &mut Value, root: &str) {
    match value {
        Value::String(s) if s.contains(PLUGIN_ROOT_VAR) => {
            *s = s.replace(PLUGIN_ROOT_VAR, root);
        }
        Value::Array(items) => items.iter_mut().for_each(|v| expand_in(v, root)),
        Value::Object(map) => map.values_mut().for_each(|v| expand_in(v, root)),
        _ => {}
    }
}

/// Plugins switched off in any settings layer. Later layers win.
fn disabled_keys(layers: &[SettingsLayer]) -> BTreeSet<String> {
    let mut disabled = BTreeSet::new();
    for layer in layers {
        for (key, enabled) in &layer.enabled_plugins {
            if *enabled {
                disabled.remove(key);
            } else {
                disabled.insert(key.clone());
            }
        }
    }
    disabled
}

/// True when an install record applies to this run's project (or to every project).
fn install_applies(install: &Value, project: Option<&Path>) -> bool {
    match install.get("scope").and_then(Value::as_str) {
        None | Some("user") => true,
        Some(_) => match (install.get("projectPath").and_then(Value::as_str), project) {
            (Some(path), Some(project)) => Path::new(path) == project,
            _ => false,
        },
    }
}

/// Registry entries as `(key, install)`: the map form holds one install object
/// or a list of them, the legacy list form carries the key inline.
fn registry_installs(registry: &Value) -> Vec<(String, &Value)> {
    match registry.get("plugins") {
        Some(Value::Object(map)) => map
            .iter()
            .flat_map(|(key, entry)| match entry {
                Value::Array(installs) => installs.iter().map(|i| (key.clone(), i)).collect(),
                other => vec![(key.clone(), other)],
            })
            .collect(),
        Some(Value::Array(list)) => list
            .iter()
            .filter_map(|i| {
                let key = i.get("name").or_else(|| i.get("id"))?.as_str()?;
                Some((key.to_string(), i))
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Enabled plugins whose install directory exists, sorted by name.
pub(super) fn discover(config: &SourceConfig, layers: &[SettingsLayer], log: &mut ReadLog) -> Vec<Plugin> {
    let registry_path = config.plugin_registry();
    let Some(registry) = read_json(&registry_path, log) else {
        return Vec::new();
    };
    let disabled = disabled_keys(layers);
    let mut seen = BTreeSet::new();
    let mut plugins = Vec::new();

    for (key, install) in registry_installs(&registry) {
        if disabled.contains(&key) || !install_applies(install, config.project()) {
            continue;
        }
        let Some(root) = install.get("installPath").and_then(Value::as_str) else {
            continue;
        };
        let root = PathBuf::from(root);
        if !root.is_dir() {
            log.warn(format!(
                "Plugin {key}: install path {} does not exist",
                root.display()
            ));
            continue;
        }
        let name = key.split('@').next().unwrap_or(&key).to_string();
        if !seen.insert(name.clone()) {
            continue;
        }
        debug!(plugin = %name, root = %root.display(), "Discovered plugin");
        plugins.push(Plugin { name, key, root });
    }
    plugins.sort_by(|a, b| a.name.cmp(&b.name));
    plugins
}
