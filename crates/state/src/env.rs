use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_BACKUP_RETENTION: usize = 10;
const DEFAULT_DEBOUNCE_SECS: u64 = 3;

/// Returns the user's home directory.
pub fn home_dir() -> Result<PathBuf> {
    #[cfg(unix)]
    if let Ok(home) = std::env::var("HOME") {
        return Ok(PathBuf::from(home));
    }
    dirs::home_dir().ok_or_else(|| anyhow::anyhow!("home directory not found"))
}

/// Returns the Claude Code configuration root (`CLAUDE_CONFIG_DIR` or `~/.claude`).
pub fn claude_home() -> Result<PathBuf> {
    if let Ok(custom) = std::env::var("CLAUDE_CONFIG_DIR") {
        if !custom.is_empty() {
            return Ok(PathBuf::from(custom));
        }
    }
    Ok(home_dir()?.join(".claude"))
}

/// Returns the hsync state root (`HSYNC_HOME` or `~/.harnesssync`).
///
/// The state document, backups, locks and `config.json` all live here.
pub fn state_root() -> Result<PathBuf> {
    if let Ok(custom) = std::env::var("HSYNC_HOME") {
        if !custom.is_empty() {
            return Ok(PathBuf::from(custom));
        }
    }
    Ok(home_dir()?.join(".harnesssync"))
}

/// Returns the active account/profile name (`HSYNC_PROFILE`, default `default`).
pub fn profile() -> String {
    std::env::var("HSYNC_PROFILE")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "default".to_string())
}

/// Returns the project directory exported by Claude Code hooks, if any.
pub fn project_dir_from_env() -> Option<PathBuf> {
    std::env::var("CLAUDE_PROJECT_DIR")
        .ok()
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
}

/// Returns the target list from `HSYNC_TARGETS` (comma separated).
pub fn env_targets() -> Option<Vec<String>> {
    std::env::var("HSYNC_TARGETS").ok().map(|s| {
        s.split(',')
            .map(|t| t.trim().to_ascii_lowercase())
            .filter(|t| !t.is_empty())
            .collect()
    })
}

/// Reads `HSYNC_PARALLEL`; `None` when unset.
pub fn env_parallel() -> Option<bool> {
    std::env::var("HSYNC_PARALLEL")
        .ok()
        .map(|s| s == "1" || s.eq_ignore_ascii_case("true"))
}

/// Checks if `HSYNC_ALLOW_SECRETS` environment variable is set to true.
pub fn env_allow_secrets() -> bool {
    std::env::var("HSYNC_ALLOW_SECRETS")
        .map(|s| s == "1" || s.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Returns the path to the optional settings file.
pub fn settings_file() -> Result<PathBuf> {
    Ok(state_root()?.join("config.json"))
}

/// User settings parsed from `config.json` under the state root.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct HsyncSettings {
    /// Targets synced when none are given explicitly.
    #[serde(default)]
    pub targets: Option<Vec<String>>,
    #[serde(default)]
    pub backup_retention: Option<usize>,
    /// Dispatch targets on a thread pool.
    #[serde(default)]
    pub parallel: Option<bool>,
    #[serde(default)]
    pub debounce_secs: Option<u64>,
    #[serde(default)]
    pub allow_secrets: Option<bool>,
}

impl HsyncSettings {
    /// Applies `HSYNC_*` environment overrides on top of the file values.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(targets) = env_targets() {
            self.targets = Some(targets);
        }
        if let Some(parallel) = env_parallel() {
            self.parallel = Some(parallel);
        }
        if env_allow_secrets() {
            self.allow_secrets = Some(true);
        }
        self
    }

    pub fn backup_retention(&self) -> usize {
        self.backup_retention.unwrap_or(DEFAULT_BACKUP_RETENTION)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_secs(self.debounce_secs.unwrap_or(DEFAULT_DEBOUNCE_SECS))
    }

    pub fn parallel(&self) -> bool {
        self.parallel.unwrap_or(false)
    }

    pub fn allow_secrets(&self) -> bool {
        self.allow_secrets.unwrap_or(false)
    }
}

/// Loads settings from disk if available, then applies environment overrides.
///
/// A malformed file is ignored with a warning rather than failing the caller.
pub fn load_settings() -> Result<HsyncSettings> {
    let path = settings_file()?;
    if !path.exists() {
        return Ok(HsyncSettings::default().with_env_overrides());
    }
    let text = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read settings: {}", path.display()))?;
    let settings = match serde_json::from_str::<HsyncSettings>(&text) {
        Ok(settings) => settings,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "Ignoring malformed settings file");
            HsyncSettings::default()
        }
    };
    Ok(settings.with_env_overrides())
}
