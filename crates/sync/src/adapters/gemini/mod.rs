//! Gemini CLI adapter.
//!
//! Gemini reads one context file per level (`~/.gemini/GEMINI.md`,
//! `<project>/GEMINI.md`) and one `settings.json`. Rules, skills, agents and
//! commands are all inlined into the context file as separate managed blocks;
//! MCP servers and tool permissions go into `settings.json`.

mod context;
mod mcp;
mod paths;
mod settings;


pub use paths::GeminiPaths;
pub use settings::{map_rule, yolo_allowed, ListKind};

use super::markers::{rules_for, sync_rules_file};
use super::traits::{SyncContext, TargetAdapter};
use crate::common::{
    AgentDef, CommandDef, McpServer, RuleSource, Settings, SkillRef, TransportKind,
};
use crate::report::SyncResult;
use crate::Result;
use std::collections::BTreeMap;
use std::path::PathBuf;

const TRANSPORTS: &[TransportKind] = &[TransportKind::Stdio, TransportKind::Sse, TransportKind::Http];

/// Adapter for the Gemini CLI.
pub struct GeminiAdapter {
    home: PathBuf,
}

impl GeminiAdapter {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }
}

impl TargetAdapter for GeminiAdapter {
    fn name(&self) -> &str {
        "gemini"
    }

    fn supported_transports(&self) -> &'static [TransportKind] {
        TRANSPORTS
    }

    fn managed_paths(&self, ctx: &SyncContext) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = ctx
            .levels()
            .into_iter()
            .filter_map(|level| GeminiPaths::for_level(level, &self.home, ctx.project_dir()))
            .flat_map(|p| [p.context, p.settings])
            .collect();
        let user_settings = GeminiPaths::user(&self.home).settings;
        if !paths.contains(&user_settings) {
            paths.push(user_settings);
        }
        paths
    }

    fn sync_rules(&self, rules: &[RuleSource], ctx: &SyncContext) -> Result<SyncResult> {
        let mut result = SyncResult::default();
        for level in ctx.levels() {
            let Some(paths) = GeminiPaths::for_level(level, &self.home, ctx.project_dir()) else {
                continue;
            };
            sync_rules_file(&paths.context, level, &rules_for(rules, level), ctx, &mut result)?;
        }
        Ok(result)
    }

    fn sync_skills(
        &self,
        skills: &BTreeMap<String, SkillRef>,
        ctx: &SyncContext,
    ) -> Result<SyncResult> {
        let sections = skills.values().map(context::skill_section).collect();
        context::sync_sections(&self.home, "skill", sections, ctx)
    }

    fn sync_agents(
        &self,
        agents: &BTreeMap<String, AgentDef>,
        ctx: &SyncContext,
    ) -> Result<SyncResult> {
        let sections = agents.values().map(context::agent_section).collect();
        context::sync_sections(&self.home, "agent", sections, ctx)
    }

    fn sync_commands(
        &self,
        commands: &BTreeMap<String, CommandDef>,
        ctx: &SyncContext,
    ) -> Result<SyncResult> {
        let sections = commands.values().map(context::command_section).collect();
        context::sync_sections(&self.home, "command", sections, ctx)
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
