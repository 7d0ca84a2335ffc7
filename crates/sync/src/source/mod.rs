//! Source Reader: discovers Claude Code configuration and builds a [`ConfigSnapshot`].
//!
//! Reading never writes to the source tree. Missing files are empty, and a
//! malformed file is skipped with a warning so one bad file never sinks the run.

mod assets;
mod mcp;
mod paths;
mod plugins;
mod rules;
mod settings;

#[cfg(test)]
mod tests;

pub use paths::SourceConfig;
pub use plugins::Plugin;

use crate::common::{ConfigSnapshot, Scope, SyncScope};
use crate::error::SyncError;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Collects recoverable read problems for the snapshot.
#[derive(Debug, Default)]
pub(crate) struct ReadLog {
    pub warnings: Vec<String>,
}

impl ReadLog {
    pub fn skip_file(&mut self, path: &Path, message: impl ToString) {
        let err = SyncError::source_read(path, message);
        warn!(path = %path.display(), error = %err, "Skipping source file");
        self.warnings.push(err.to_string());
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{message}");
        self.warnings.push(message);
    }
}

/// Reads an optional text file; unreadable files are logged and treated as absent.
pub(crate) fn read_text(path: &Path, log: &mut ReadLog) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(text) => Some(text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            log.skip_file(path, e);
            None
        }
    }
}

/// Reads an optional JSON file; malformed JSON is logged and treated as absent.
pub(crate) fn read_json(path: &Path, log: &mut ReadLog) -> Option<serde_json::Value> {
    let text = read_text(path, log)?;
    if text.trim().is_empty() {
        return None;
    }
    match serde_json::from_str(&text) {
        Ok(value) => Some(value),
        Err(e) => {
            log.skip_file(path, format!("invalid JSON: {e}"));
            None
        }
    }
}

/// Discovers Claude Code configuration across user, project, local and plugin scopes.
#[derive(Debug, Clone)]
pub struct SourceReader {
    config: SourceConfig,
}

impl SourceReader {
    pub fn new(config: SourceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    /// Builds the snapshot for `scope`. Never fails; problems become warnings.
    pub fn read(&self, scope: SyncScope) -> ConfigSnapshot {
        let mut log = ReadLog::default();
        let layers = settings::read_layers(&self.config, &mut log);
        let plugins = if scope.includes(Scope::Plugin) {
            plugins::discover(&self.config, &layers, &mut log)
        } else {
            Vec::new()
        };

        let snapshot = ConfigSnapshot {
            scope,
            rules: rules::read_rules(&self.config, scope, &mut log),
            skills: assets::read_skills(&self.config, scope, &plugins, &mut log),
            agents: assets::read_agents(&self.config, scope, &plugins, &mut log),
            commands: assets::read_commands(&self.config, scope, &plugins, &mut log),
            mcp_servers: mcp::read_servers(&self.config, scope, &plugins, &mut log),
            settings: settings::merge(&layers, scope),
            warnings: log.warnings,
        };
        debug!(
            scope = %scope,
            rules = snapshot.rules.len(),
            skills = snapshot.skills.len(),
            agents = snapshot.agents.len(),
            commands = snapshot.commands.len(),
            mcp = snapshot.mcp_servers.len(),
            plugins = plugins.len(),
            warnings = snapshot.warnings.len(),
            "Read source snapshot"
        );
        snapshot
    }
}
