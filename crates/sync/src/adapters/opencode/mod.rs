//! OpenCode adapter.
//!
//! OpenCode is the closest match to the Claude layout: skills, agents and
//! commands are symlinked one by one into `skills/`, `agents/` and
//! `commands/` (`~/.config/opencode/` or `<project>/.opencode/`). Rules go
//! into a managed block of `AGENTS.md`; MCP servers and permissions into
//! `opencode.json`.

mod assets;
mod mcp;
mod paths;
mod settings;


pub use paths::OpenCodePaths;
pub use settings::permission_level;

use super::markers::{rules_for, sync_rules_file};
use super::traits::{SyncContext, TargetAdapter};
use crate::common::{
    AgentDef, CommandDef, McpServer, RuleSource, Settings, SkillRef, TransportKind,
};
use crate::report::SyncResult;
use crate::Result;
use assets::{Asset, AssetKind};
use std::collections::BTreeMap;
use std::path::PathBuf;

const TRANSPORTS: &[TransportKind] = &[TransportKind::Stdio, TransportKind::Http];

/// Adapter for OpenCode.
pub struct OpenCodeAdapter {
    home: PathBuf,
}

impl OpenCodeAdapter {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }
}

impl TargetAdapter for OpenCodeAdapter {
    fn name(&self) -> &str {
        "opencode"
    }

    fn supported_transports(&self) -> &'static [TransportKind] {
        TRANSPORTS
    }

    fn managed_paths(&self, ctx: &SyncContext) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = ctx
            .levels()
            .into_iter()
            .filter_map(|level| OpenCodePaths::for_level(level, &self.home, ctx.project_dir()))
            .flat_map(|p| [p.agents_md, p.skills_dir, p.agents_dir, p.commands_dir, p.config])
            .collect();
        let user_config = OpenCodePaths::user(&self.home).config;
        if !paths.contains(&user_config) {
            paths.push(user_config);
        }
        paths
    }

    fn sync_rules(&self, rules: &[RuleSource], ctx: &SyncContext) -> Result<SyncResult> {
        let mut result = SyncResult::default();
        for level in ctx.levels() {
            let Some(paths) = OpenCodePaths::for_level(level, &self.home, ctx.project_dir()) else {
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
        let assets = skills.values().map(|s| Asset {
            name: &s.name,
            level: s.scope.level(),
            source: &s.path,
        });
        assets::sync_assets(&self.home, AssetKind::Skill, assets, ctx)
    }

    fn sync_agents(
        &self,
        agents: &BTreeMap<String, AgentDef>,
        ctx: &SyncContext,
    ) -> Result<SyncResult> {
        let assets = agents.values().map(|a| Asset {
            name: &a.name,
            level: a.scope.level(),
            source: &a.path,
        });
        assets::sync_assets(&self.home, AssetKind::Agent, assets, ctx)
    }

    fn sync_commands(
        &self,
        commands: &BTreeMap<String, CommandDef>,
        ctx: &SyncContext,
    ) -> Result<SyncResult> {
        let assets = commands.values().map(|c| Asset {
            name: &c.name,
            level: c.scope.level(),
            source: &c.path,
        });
        assets::sync_assets(&self.home, AssetKind::Command, assets, ctx)
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
