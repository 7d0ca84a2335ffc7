//! Skills, agents and commands, each symlinked into OpenCode's native directories.

use super::paths::OpenCodePaths;
use crate::adapters::links::{cleanup_stale, place_link, remove_managed};
use crate::adapters::traits::SyncContext;
use crate::adapters::utils::sanitize_name;
use crate::common::{item_id, TargetLevel};
use crate::report::{SkipReason, SyncResult};
use crate::Result;
use std::path::{Path, PathBuf};

/// Which OpenCode directory an asset kind lives in, and how entries are named.
#[derive(Debug, Clone, Copy)]
pub(super) enum AssetKind {
    /// `skills/<name>/` directory
    Skill,
    /// `agents/<name>.md`
    Agent,
    /// `commands/<name>.md`
    Command,
}

impl AssetKind {
    fn id_kind(self) -> &'static str {
        match self {
            AssetKind::Skill => "skill",
            AssetKind::Agent => "agent",
            AssetKind::Command => "command",
        }
    }

    fn entry(self, paths: &OpenCodePaths, name: &str) -> PathBuf {
        let name = sanitize_name(name);
        match self {
            AssetKind::Skill => paths.skills_dir.join(name),
            AssetKind::Agent => paths.agents_dir.join(format!("{name}.md")),
            AssetKind::Command => paths.commands_dir.join(format!("{name}.md")),
        }
    }
}

/// One item to link: its name, landing level and source path.
pub(super) struct Asset<'a> {
    pub name: &'a str,
    pub level: TargetLevel,
    pub source: &'a Path,
}

pub(super) fn sync_assets<'a>(
    home: &Path,
    kind: AssetKind,
    assets: impl IntoIterator<Item = Asset<'a>>,
    ctx: &SyncContext,
) -> Result<SyncResult> {
    let mut result = SyncResult::default();
    let levels = ctx.levels();
    let locate = |level: TargetLevel, name: &str| {
        if !levels.contains(&level) {
            return None;
        }
        OpenCodePaths::for_level(level, home, ctx.project_dir()).map(|p| kind.entry(&p, name))
    };

    for asset in assets {
        let id = item_id(kind.id_kind(), asset.level, asset.name);
        let Some(dst) = locate(asset.level, asset.name) else {
            if asset.level == TargetLevel::Project {
                result.skip(SkipReason::NoProjectDir { item: id });
            }
            continue;
        };
        place_link(asset.source, &dst, &id, ctx, &mut result)?;
    }
    cleanup_stale(kind.id_kind(), ctx, &mut result, locate, remove_managed)?;
    Ok(result)
}
