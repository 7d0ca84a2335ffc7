//! Trait definition for target adapters.

use super::env_vars::EnvMap;
use crate::common::{
    AgentDef, CommandDef, McpServer, RuleSource, Settings, SkillRef, SyncScope, TargetLevel,
    TransportKind,
};
use crate::report::SyncResult;
use crate::Result;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

#[cfg(test)]
use mockall::automock;

/// Per-run inputs every adapter call receives.
#[derive(Debug, Clone, Default)]
pub struct SyncContext {
    pub scope: SyncScope,
    /// Project root; `None` for user-only runs outside a project.
    pub project_dir: Option<PathBuf>,
    /// Process environment captured at the start of the run.
    pub env: EnvMap,
    /// Item ids this target held after the previous sync of the same scope.
    pub previous_items: BTreeSet<String>,
}

impl SyncContext {
    pub fn new(scope: SyncScope, project_dir: Option<PathBuf>) -> Self {
        Self {
            scope,
            project_dir,
            env: std::env::vars().collect(),
            previous_items: BTreeSet::new(),
        }
    }

    pub fn with_env(mut self, env: EnvMap) -> Self {
        self.env = env;
        self
    }

    pub fn with_previous_items(mut self, items: impl IntoIterator<Item = String>) -> Self {
        self.previous_items = items.into_iter().collect();
        self
    }

    pub fn project_dir(&self) -> Option<&Path> {
        self.project_dir.as_deref()
    }

    pub fn was_managed(&self, id: &str) -> bool {
        self.previous_items.contains(id)
    }

    /// Levels this run may write to.
    pub fn levels(&self) -> Vec<TargetLevel> {
        match (self.scope, self.project_dir.is_some()) {
            (SyncScope::User, _) | (_, false) => vec![TargetLevel::User],
            (SyncScope::Project, true) | (SyncScope::Local, true) => vec![TargetLevel::Project],
            (SyncScope::All, true) => vec![TargetLevel::User, TargetLevel::Project],
        }
    }

    #[cfg(test)]
    pub(crate) fn for_tests(project: &Path) -> Self {
        Self::new(SyncScope::All, Some(project.to_path_buf())).with_env(EnvMap::new())
    }
}

/// Translates the canonical snapshot into one target tool's native files.
///
/// Each `sync_*` call writes its slice of the snapshot, removes items of the
/// same kind that were managed before but are gone now, and reports what it
/// did. Per-item problems are recorded in the result; an `Err` means the target
/// is in an unknown state and the caller restores its backup.
#[cfg_attr(test, automock)]
pub trait TargetAdapter: Send + Sync {
    /// Target identifier (e.g., "codex", "gemini")
    fn name(&self) -> &str;

    /// MCP transports the target can run
    fn supported_transports(&self) -> &'static [TransportKind];

    /// Files and directories the adapter may modify for this run (backed up before writing)
    fn managed_paths(&self, ctx: &SyncContext) -> Vec<PathBuf>;

    fn sync_rules(&self, rules: &[RuleSource], ctx: &SyncContext) -> Result<SyncResult>;

    fn sync_skills(
        &self,
        skills: &BTreeMap<String, SkillRef>,
        ctx: &SyncContext,
    ) -> Result<SyncResult>;

    fn sync_agents(
        &self,
        agents: &BTreeMap<String, AgentDef>,
        ctx: &SyncContext,
    ) -> Result<SyncResult>;

    fn sync_commands(
        &self,
        commands: &BTreeMap<String, CommandDef>,
        ctx: &SyncContext,
    ) -> Result<SyncResult>;

    fn sync_mcp(
        &self,
        servers: &BTreeMap<String, McpServer>,
        ctx: &SyncContext,
    ) -> Result<SyncResult>;

    fn sync_settings(&self, settings: &Settings, ctx: &SyncContext) -> Result<SyncResult>;
}
