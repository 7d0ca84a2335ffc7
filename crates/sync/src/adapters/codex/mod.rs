//! Codex adapter.
//!
//! ## Layout
//!
//! - User level: `~/.codex/AGENTS.md`, `~/.codex/skills/`, `~/.codex/config.toml`
//! - Project level: `<project>/AGENTS.md`, `<project>/.codex/skills/`,
//!   `<project>/.codex/config.toml`
//!
//! Rules live in a managed block of `AGENTS.md`. Skills are symlinked;
//! agents and commands are converted into generated skills. MCP servers and
//! permissions are edited into `config.toml` through a parsed table, never by
//! string splicing.

mod mcp;
mod paths;
mod settings;
mod skills;

#[cfg(test)]
mod tests;

pub use paths::CodexPaths;
pub use settings::codex_policy;

use super::markers::{rules_for, sync_rules_file};
use super::traits::{SyncContext, TargetAdapter};
use crate::common::{
    AgentDef, CommandDef, McpServer, RuleSource, Settings, SkillRef, TransportKind,
};
use crate::report::SyncResult;
use crate::Result;
use std::collections::BTreeMap;
use std::path::PathBuf;

const TRANSPORTS: &[TransportKind] = &[TransportKind::Stdio, TransportKind::Http];

/// Adapter for the Codex CLI.
pub struct CodexAdapter {
    home: PathBuf,
}

impl CodexAdapter {
    /// Creates an adapter writing under `home` (`~/.codex` lives beneath it).
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    fn level_paths(&self, ctx: &SyncContext) -> Vec<CodexPaths> {
        ctx.levels()
            .into_iter()
            .filter_map(|level| CodexPaths::for_level(level, &self.home, ctx.project_dir()))
            .collect()
    }
}

impl TargetAdapter for CodexAdapter {
    fn name(&self) -> &str {
        "codex"
    }

    fn supported_transports(&self) -> &'static [TransportKind] {
        TRANSPORTS
    }

    fn managed_paths(&self, ctx: &SyncContext) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .level_paths(ctx)
            .into_iter()
            .flat_map(|p| [p.agents_md, p.skills_dir, p.config_toml])
            .collect();
        // Local MCP servers land in the user config even on project-only runs.
        let user_config = CodexPaths::user(&self.home).config_toml;
        if !paths.contains(&user_config) {
            paths.push(user_config);
        }
        paths
    }

    fn sync_rules(&self, rules: &[RuleSource], ctx: &SyncContext) -> Result<SyncResult> {
        let mut result = SyncResult::default();
        for level in ctx.levels() {
            let Some(paths) = CodexPaths::for_level(level, &self.home, ctx.project_dir()) else {
                continue;
            };
            sync_rules_file(&paths.agents_md, level, &rules_for(rules, level), ctx, &mut result)?;
        }
        Ok(result)
    }

    fn sync_skills(
        &self,
        skills: &BTreeMap<String, SkillRef>,
        ctx: &SyncContext,
    ) -> Result<SyncResult> {
        skills::sync_skills(&self.home, skills, ctx)
    }

    fn sync_agents(
        &self,
        agents: &BTreeMap<String, AgentDef>,
        ctx: &SyncContext,
    ) -> Result<SyncResult> {
        skills::sync_agents(&self.home, agents, ctx)
    }

    fn sync_commands(
        &self,
        commands: &BTreeMap<String, CommandDef>,
        ctx: &SyncContext,
    ) -> Result<SyncResult> {
        skills::sync_commands(&self.home, commands, ctx)
    }

    fn sync_mcp(
        &self,
        servers: &BTreeMap<String, McpServer>,
        ctx: &SyncContext,
    ) -> Result<SyncResult> {
        mcp::sync_mcp(&self.home, servers, ctx, TRANSPORTS)
    }

    fn sync_settings(&self, settings: &Settings, ctx: &SyncContext) -> Result<SyncResult> {
        settings::sync_settings(&self.home, settings, ctx)
    }
}
