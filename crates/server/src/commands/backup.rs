//! Handlers for `backup list` and `backup prune`.

use super::orchestrator;
use anyhow::Result;
use hsync_state::load_settings;
use std::path::PathBuf;

pub(crate) fn handle_backup_list_command(target: String, project_dir: Option<PathBuf>) -> Result<()> {
    let orch = orchestrator(project_dir)?;
    orch.registry().get(&target)?;
    let dirs = orch.backups().list(&target)?;
    if dirs.is_empty() {
        println!("(no backups for {target})");
    }
    for dir in dirs {
        let record = orch.backups().load(&dir)?;
        println!(
            "{}  {} entries  {}",
            record.created_at,
            record.entries.len(),
            dir.display()
        );
    }
    Ok(())
}

pub(crate) fn handle_backup_prune_command(
    targets: Vec<String>,
    keep: Option<usize>,
    project_dir: Option<PathBuf>,
) -> Result<()> {
    let orch = orchestrator(project_dir)?;
    let keep = match keep {
        Some(keep) => keep,
        None => load_settings()?.backup_retention(),
    };
    let targets = if targets.is_empty() {
        orch.registry().list()
    } else {
        for target in &targets {
            orch.registry().get(target)?;
        }
        targets
    };
    for (target, removed) in orch.prune_backups(&targets, keep)? {
        println!("{target}: removed {removed} backup(s), keeping up to {keep}");
    }
    Ok(())
}
