//! Path resolution for the Gemini adapter.

use crate::common::TargetLevel;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeminiPaths {
    /// Context file all markdown content is inlined into
    pub context: PathBuf,
    pub settings: PathBuf,
}

impl GeminiPaths {
    pub fn user(home: &Path) -> Self {
        let root = home.join(".gemini");
        Self {
            context: root.join("GEMINI.md"),
            settings: root.join("settings.json"),
        }
    }

    pub fn project(project: &Path) -> Self {
        Self {
            context: project.join("GEMINI.md"),
            settings: project.join(".gemini").join("settings.json"),
        }
    }

    pub fn for_level(level: TargetLevel, home: &Path, project: Option<&Path>) -> Option<Self> {
        match level {
            TargetLevel::User => Some(Self::user(home)),
            TargetLevel::Project => project.map(Self::project),
        }
    }
}
