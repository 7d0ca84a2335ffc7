//! Physical locations of Claude Code configuration.

use std::path::{Path, PathBuf};

/// Roots the reader works from. Built once per run; nothing is read from globals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    /// `~/.claude` (or `CLAUDE_CONFIG_DIR`)
    pub claude_home: PathBuf,
    /// Home directory holding `~/.claude.json`
    pub home: PathBuf,
    pub project_dir: Option<PathBuf>,
}

impl SourceConfig {
    /// Resolves roots from the process environment.
    pub fn from_env(project_dir: Option<PathBuf>) -> crate::Result<Self> {
        Ok(Self {
            claude_home: hsync_state::claude_home()?,
            home: hsync_state::home_dir()?,
            project_dir,
        })
    }

    pub fn user_rules(&self) -> PathBuf {
        self.claude_home.join("CLAUDE.md")
    }

    pub fn user_skills(&self) -> PathBuf {
        self.claude_home.join("skills")
    }

    pub fn user_agents(&self) -> PathBuf {
        self.claude_home.join("agents")
    }

    pub fn user_commands(&self) -> PathBuf {
        self.claude_home.join("commands")
    }

    pub fn user_settings(&self) -> PathBuf {
        self.claude_home.join("settings.json")
    }

    /// `~/.claude.json`: user and local MCP servers.
    pub fn user_mcp(&self) -> PathBuf {
        self.home.join(".claude.json")
    }

    pub fn plugin_registry(&self) -> PathBuf {
        self.claude_home.join("plugins").join("installed_plugins.json")
    }

    pub fn project(&self) -> Option<&Path> {
        self.project_dir.as_deref()
    }

    /// `<project>/CLAUDE.md` then `<project>/.claude/CLAUDE.md`.
    pub fn project_rules(&self) -> Vec<PathBuf> {
        self.project()
            .map(|p| vec![p.join("CLAUDE.md"), p.join(".claude").join("CLAUDE.md")])
            .unwrap_or_default()
    }

    pub fn local_rules(&self) -> Option<PathBuf> {
        self.project().map(|p| p.join("CLAUDE.local.md"))
    }

    pub fn project_dot(&self, child: &str) -> Option<PathBuf> {
        self.project().map(|p| p.join(".claude").join(child))
    }

    pub fn project_mcp(&self) -> Option<PathBuf> {
        self.project().map(|p| p.join(".mcp.json"))
    }
}
