//! CLI command handlers for the hsync application.

mod backup;
mod hook;
mod serve;
mod status;
mod sync;

pub(crate) use backup::{handle_backup_list_command, handle_backup_prune_command};
pub(crate) use hook::handle_hook_command;
pub(crate) use serve::handle_serve_command;
pub(crate) use status::{handle_status_command, handle_targets_command};
pub(crate) use sync::handle_sync_command;

use anyhow::Result;
use hsync_sync::SyncOrchestrator;
use std::path::PathBuf;

/// Project root: the explicit flag, then `CLAUDE_PROJECT_DIR`, then the working directory.
pub(crate) fn resolve_project_dir(flag: Option<PathBuf>) -> Option<PathBuf> {
    flag.or_else(hsync_state::project_dir_from_env)
        .or_else(|| std::env::current_dir().ok())
}

pub(crate) fn orchestrator(project_dir: Option<PathBuf>) -> Result<SyncOrchestrator> {
    SyncOrchestrator::from_env(project_dir)
}
