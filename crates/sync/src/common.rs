//! Canonical configuration snapshot shared by the reader, adapters and orchestrator.

use crate::adapters::utils::hash_content;
use hsync_state::Fingerprint;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Origin tier of a configuration item.
///
/// Variants are declared in ascending precedence, so `Ord` is the precedence
/// order: an explicit user entry outranks a plugin-provided one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Plugin,
    User,
    Project,
    Local,
}

impl Scope {
    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Plugin => "plugin",
            Scope::User => "user",
            Scope::Project => "project",
            Scope::Local => "local",
        }
    }

    /// Where file-based items (rules, skills, agents, commands) from this scope land.
    pub fn level(self) -> TargetLevel {
        match self {
            Scope::Plugin | Scope::User => TargetLevel::User,
            Scope::Project | Scope::Local => TargetLevel::Project,
        }
    }

    /// Where MCP servers from this scope land. Local servers are private to the
    /// user, so they go to the user-level config rather than a shared project file.
    pub fn mcp_level(self) -> TargetLevel {
        match self {
            Scope::Project => TargetLevel::Project,
            _ => TargetLevel::User,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which tiers a sync run reads and writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncScope {
    User,
    Project,
    Local,
    #[default]
    All,
}

impl SyncScope {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncScope::User => "user",
            SyncScope::Project => "project",
            SyncScope::Local => "local",
            SyncScope::All => "all",
        }
    }

    /// True when items from `scope` belong to this run.
    pub fn includes(self, scope: Scope) -> bool {
        match self {
            SyncScope::All => true,
            SyncScope::User => matches!(scope, Scope::User | Scope::Plugin),
            SyncScope::Project => scope == Scope::Project,
            SyncScope::Local => scope == Scope::Local,
        }
    }

    /// True when project-level sources must be read.
    pub fn needs_project(self) -> bool {
        !matches!(self, SyncScope::User)
    }
}

impl fmt::Display for SyncScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncScope {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "user" => Ok(SyncScope::User),
            "project" => Ok(SyncScope::Project),
            "local" => Ok(SyncScope::Local),
            "all" => Ok(SyncScope::All),
            other => anyhow::bail!("Invalid scope '{other}'. Use user, project, local or all."),
        }
    }
}

/// User-level (home directory) or project-level target location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TargetLevel {
    User,
    Project,
}

/// One rules file, kept separate so adapters can route it by scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSource {
    pub scope: Scope,
    pub path: PathBuf,
    pub content: String,
}

/// A skill directory reference. The manifest body is never held in memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillRef {
    pub name: String,
    /// Directory containing `SKILL.md`.
    pub path: PathBuf,
    pub scope: Scope,
    #[serde(default)]
    pub description: Option<String>,
    /// SHA-256 of `SKILL.md`, so edits to a skill change the snapshot hash.
    pub manifest_hash: String,
}

impl SkillRef {
    pub fn manifest_path(&self) -> PathBuf {
        self.path.join("SKILL.md")
    }
}

/// A parsed subagent definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDef {
    pub name: String,
    pub path: PathBuf,
    pub scope: Scope,
    pub description: String,
    #[serde(default)]
    pub tools: Vec<String>,
    /// Free-text instructions (the `<role>` section when present, else the body).
    pub instructions: String,
}

/// A parsed slash command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandDef {
    /// Trigger name without the leading slash.
    pub name: String,
    pub path: PathBuf,
    pub scope: Scope,
    pub description: String,
    #[serde(default)]
    pub argument_hint: Option<String>,
    pub body: String,
}

/// Transport kinds an MCP server can use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Stdio,
    Http,
    Sse,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransportKind::Stdio => "stdio",
            TransportKind::Http => "http",
            TransportKind::Sse => "sse",
        })
    }
}

/// Connection descriptor of an MCP server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "lowercase")]
pub enum McpTransport {
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: BTreeMap<String, String>,
    },
    Http {
        url: String,
        #[serde(default)]
        headers: BTreeMap<String, String>,
    },
    Sse {
        url: String,
        #[serde(default)]
        headers: BTreeMap<String, String>,
    },
}

impl McpTransport {
    pub fn kind(&self) -> TransportKind {
        match self {
            McpTransport::Stdio { .. } => TransportKind::Stdio,
            McpTransport::Http { .. } => TransportKind::Http,
            McpTransport::Sse { .. } => TransportKind::Sse,
        }
    }
}

/// An MCP server as read from the source, tagged with its origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpServer {
    pub name: String,
    pub transport: McpTransport,
    pub scope: Scope,
    /// Providing plugin, for plugin-scoped servers.
    #[serde(default)]
    pub plugin: Option<String>,
    /// File the descriptor was read from.
    pub source: PathBuf,
}

impl McpServer {
    pub fn kind(&self) -> TransportKind {
        self.transport.kind()
    }
}

/// Tool permission declarations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
    #[serde(default)]
    pub ask: Vec<String>,
    #[serde(default, rename = "defaultMode")]
    pub default_mode: Option<String>,
}

impl Permissions {
    /// True only when the source explicitly asks to skip every approval.
    pub fn requests_full_automation(&self) -> bool {
        self.default_mode.as_deref() == Some("bypassPermissions")
    }

    pub fn is_empty(&self) -> bool {
        self.allow.is_empty()
            && self.deny.is_empty()
            && self.ask.is_empty()
            && self.default_mode.is_none()
    }
}

/// Merged settings after scope precedence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub permissions: Permissions,
    /// Highest scope that contributed a value.
    #[serde(default)]
    pub scope: Option<Scope>,
}

impl Settings {
    pub fn is_empty(&self) -> bool {
        self.env.is_empty() && self.permissions.is_empty()
    }

    /// Level whose target config receives these settings.
    pub fn level(&self) -> TargetLevel {
        self.scope.map(Scope::level).unwrap_or(TargetLevel::User)
    }
}

/// Everything the reader discovered for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub scope: SyncScope,
    /// Ordered user, project, local.
    pub rules: Vec<RuleSource>,
    pub skills: BTreeMap<String, SkillRef>,
    pub agents: BTreeMap<String, AgentDef>,
    pub commands: BTreeMap<String, CommandDef>,
    pub mcp_servers: BTreeMap<String, McpServer>,
    pub settings: Settings,
    /// Recoverable problems met while reading; not part of the hash.
    #[serde(skip)]
    pub warnings: Vec<String>,
}

impl ConfigSnapshot {
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
            && self.skills.is_empty()
            && self.agents.is_empty()
            && self.commands.is_empty()
            && self.mcp_servers.is_empty()
            && self.settings.is_empty()
    }

    /// Number of items per section, in adapter call order.
    pub fn counts(&self) -> [(&'static str, usize); 6] {
        [
            ("rules", self.rules.len()),
            ("skills", self.skills.len()),
            ("agents", self.agents.len()),
            ("commands", self.commands.len()),
            ("mcp", self.mcp_servers.len()),
            ("settings", usize::from(!self.settings.is_empty())),
        ]
    }
}

impl Fingerprint for ConfigSnapshot {
    fn content_hash(&self) -> String {
        match serde_json::to_vec(self) {
            Ok(bytes) => hash_content(&bytes),
            // Non UTF-8 paths cannot be serialized; Debug output is still stable.
            Err(_) => hash_content(format!("{self:?}").as_bytes()),
        }
    }
}

impl TargetLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            TargetLevel::User => "user",
            TargetLevel::Project => "project",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(TargetLevel::User),
            "project" => Some(TargetLevel::Project),
            _ => None,
        }
    }
}

/// Builds a managed item identifier such as `skill:user:review`.
pub fn item_id(kind: &str, level: TargetLevel, name: &str) -> String {
    format!("{kind}:{}:{name}", level.as_str())
}

/// Splits `skill:user:review` into its kind, level and name.
pub fn parse_item_id(id: &str) -> Option<(&str, TargetLevel, &str)> {
    let (kind, rest) = id.split_once(':')?;
    let (level, name) = rest.split_once(':')?;
    Some((kind, TargetLevel::parse(level)?, name))
}

/// Items of `kind` that were managed before but are absent from `current`.
pub fn stale_items<'a>(
    previous: &'a BTreeSet<String>,
    current: &BTreeSet<String>,
    kind: &str,
) -> Vec<(TargetLevel, &'a str)> {
    previous
        .iter()
        .filter(|id| !current.contains(*id))
        .filter_map(|id| parse_item_id(id))
        .filter(|(k, _, _)| *k == kind)
        .map(|(_, level, name)| (level, name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_order_is_precedence() {
        assert!(Scope::Local > Scope::Project);
        assert!(Scope::Project > Scope::User);
        assert!(Scope::User > Scope::Plugin);
    }

    #[test]
    fn plugin_and_local_mcp_route_to_user_level() {
        assert_eq!(Scope::Plugin.mcp_level(), TargetLevel::User);
        assert_eq!(Scope::Local.mcp_level(), TargetLevel::User);
        assert_eq!(Scope::Project.mcp_level(), TargetLevel::Project);
        assert_eq!(Scope::Local.level(), TargetLevel::Project);
    }

    #[test]
    fn sync_scope_parses_and_filters() {
        let scope: SyncScope = "USER".parse().unwrap();
        assert!(scope.includes(Scope::Plugin));
        assert!(!scope.includes(Scope::Project));
        assert!("nope".parse::<SyncScope>().is_err());
        assert!(SyncScope::All.includes(Scope::Local));
    }

    #[test]
    fn snapshot_hash_ignores_warnings_but_tracks_content() {
        let mut a = ConfigSnapshot::default();
        let mut b = ConfigSnapshot::default();
        b.warnings.push("noise".into());
        assert_eq!(a.content_hash(), b.content_hash());

        a.settings.env.insert("K".into(), "V".into());
        assert_ne!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn stale_items_filters_by_kind() {
        let previous: BTreeSet<String> = ["skill:user:a", "skill:project:b", "mcp:user:a"]
            .into_iter()
            .map(String::from)
            .collect();
        let current: BTreeSet<String> = ["skill:user:a"].into_iter().map(String::from).collect();
        assert_eq!(
            stale_items(&previous, &current, "skill"),
            vec![(TargetLevel::Project, "b")]
        );
        assert_eq!(
            stale_items(&previous, &current, "mcp"),
            vec![(TargetLevel::User, "a")]
        );
    }

    #[test]
    fn item_ids_round_trip_names_with_colons() {
        let id = item_id("mcp", TargetLevel::Project, "db:primary");
        assert_eq!(
            parse_item_id(&id),
            Some(("mcp", TargetLevel::Project, "db:primary"))
        );
    }
}
