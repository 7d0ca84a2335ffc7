//! Path resolution for the OpenCode adapter.

use crate::common::TargetLevel;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenCodePaths {
    pub agents_md: PathBuf,
    pub skills_dir: PathBuf,
    pub agents_dir: PathBuf,
    pub commands_dir: PathBuf,
    pub config: PathBuf,
}

impl OpenCodePaths {
    /// `~/.config/opencode/`
    pub fn user(home: &Path) -> Self {
        let root = home.join(".config").join("opencode");
        Self {
            agents_md: root.join("AGENTS.md"),
            skills_dir: root.join("skills"),
            agents_dir: root.join("agents"),
            commands_dir: root.join("commands"),
            config: root.join("opencode.json"),
        }
    }

    /// `<project>/.opencode/` for assets, `<project>/opencode.json` for config.
    pub fn project(project: &Path) -> Self {
        let dot = project.join(".opencode");
        Self {
            agents_md: project.join("AGENTS.md"),
            skills_dir: dot.join("skills"),
            agents_dir: dot.join("agents"),
            commands_dir: dot.join("commands"),
            config: project.join("opencode.json"),
        }
    }

    pub fn for_level(level: TargetLevel, home: &Path, project: Option<&Path>) -> Option<Self> {
        match level {
            TargetLevel::User => Some(Self::user(home)),
            TargetLevel::Project => project.map(Self::project),
        }
    }
}
