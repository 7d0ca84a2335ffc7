//! Path resolution for the Codex adapter.

use crate::common::TargetLevel;
use std::path::{Path, PathBuf};

/// Files Codex reads at one level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodexPaths {
    pub agents_md: PathBuf,
    pub skills_dir: PathBuf,
    pub config_toml: PathBuf,
}

impl CodexPaths {
    /// `~/.codex/{AGENTS.md,skills,config.toml}`
    pub fn user(home: &Path) -> Self {
        let root = home.join(".codex");
        Self {
            agents_md: root.join("AGENTS.md"),
            skills_dir: root.join("skills"),
            config_toml: root.join("config.toml"),
        }
    }

    /// `<project>/AGENTS.md` plus `<project>/.codex/{skills,config.toml}`
    pub fn project(project: &Path) -> Self {
        let dot = project.join(".codex");
        Self {
            agents_md: project.join("AGENTS.md"),
            skills_dir: dot.join("skills"),
            config_toml: dot.join("config.toml"),
        }
    }

    pub fn for_level(level: TargetLevel, home: &Path, project: Option<&Path>) -> Option<Self> {
        match level {
            TargetLevel::User => Some(Self::user(home)),
            TargetLevel::Project => project.map(Self::project),
        }
    }
}

/// Skill directory name for a converted agent.
pub fn agent_skill_name(agent: &str) -> String {
    format!("agent-{agent}")
}

/// Skill directory name for a converted slash command.
pub fn command_skill_name(command: &str) -> String {
    format!("cmd-{command}")
}
