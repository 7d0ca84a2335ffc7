//! `settings.json` layers and their merge.

use super::{read_json, ReadLog, SourceConfig};
use crate::common::{Permissions, Scope, Settings, SyncScope};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPermissions {
    allow: Option<Vec<String>>,
    deny: Option<Vec<String>>,
    ask: Option<Vec<String>>,
    default_mode: Option<String>,
}

/// One settings file as written by the user. Unknown keys are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct SettingsLayer {
    #[serde(skip)]
    pub scope: Option<Scope>,
    #[serde(default)]
    env: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    permissions: Option<RawPermissions>,
    #[serde(default)]
    pub enabled_plugins: BTreeMap<String, bool>,
}

impl SettingsLayer {
    fn scope(&self) -> Scope {
        self.scope.unwrap_or(Scope::User)
    }
}

fn read_layer(path: &Path, scope: Scope, log: &mut ReadLog) -> Option<SettingsLayer> {
    let value = read_json(path, log)?;
    match serde_json::from_value::<SettingsLayer>(value) {
        Ok(mut layer) => {
            layer.scope = Some(scope);
            Some(layer)
        }
        Err(e) => {
            log.skip_file(path, format!("unexpected settings shape: {e}"));
            None
        }
    }
}

/// Every settings file that exists, in ascending precedence (user, project, local).
pub(super) fn read_layers(config: &SourceConfig, log: &mut ReadLog) -> Vec<SettingsLayer> {
    let mut files = vec![(Scope::User, config.user_settings())];
    files.extend(config.project_dot("settings.json").map(|p| (Scope::Project, p)));
    files.extend(config.project_dot("settings.local.json").map(|p| (Scope::Local, p)));
    files
        .into_iter()
        .filter_map(|(scope, path)| read_layer(&path, scope, log))
        .collect()
}

fn env_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Merges the layers of `scope`: `env` key-wise, each permission list and
/// `defaultMode` replaced by the highest layer that sets it.
pub(super) fn merge(layers: &[SettingsLayer], scope: SyncScope) -> Settings {
    let mut settings = Settings::default();
    let mut perms = Permissions::default();
    for layer in layers.iter().filter(|l| scope.includes(l.scope())) {
        let mut contributed = false;
        for (key, value) in &layer.env {
            settings.env.insert(key.clone(), env_string(value));
            contributed = true;
        }
        if let Some(raw) = &layer.permissions {
            if let Some(allow) = &raw.allow {
                perms.allow = allow.clone();
                contributed = true;
            }
            if let Some(deny) = &raw.deny {
                perms.deny = deny.clone();
                contributed = true;
            }
            if let Some(ask) = &raw.ask {
                perms.ask = ask.clone();
                contributed = true;
            }
            if let Some(mode) = &raw.default_mode {
                perms.default_mode = Some(mode.clone());
                contributed = true;
            }
        }
        if contributed {
            settings.scope = Some(layer.scope());
        }
    }
    settings.permissions = perms;
    settings
}
