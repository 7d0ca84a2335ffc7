//! Handlers for the `status` and `targets` commands.

use super::orchestrator;
use crate::cli::ScopeArg;
use anyhow::Result;
use hsync_state::load_settings;
use hsync_sync::{StatusReport, TargetState};
use std::path::PathBuf;

fn describe(target: &TargetState) -> String {
    let Some(when) = &target.last_synced_at else {
        return format!("  {:<10} never synced", target.target);
    };
    let mut line = format!(
        "  {:<10} {} at {when}, {} items",
        target.target,
        target
            .status
            .map(|s| format!("{s:?}").to_lowercase())
            .unwrap_or_else(|| "unknown".into()),
        target.items
    );
    if target.source_changed {
        line.push_str(" [source changed]");
    }
    if target.has_target_drift() {
        line.push_str(&format!(
            " [target drift: {} modified, {} missing]",
            target.modified.len(),
            target.missing.len()
        ));
    }
    line
}

pub(crate) fn format_status(report: &StatusReport) -> String {
    let mut out = format!(
        "Profile {} (scope: {}), last sync: {}\n",
        report.profile,
        report.scope,
        report.last_sync.as_deref().unwrap_or("never")
    );
    for target in &report.targets {
        out.push_str(&describe(target));
        out.push('\n');
        for path in target.modified.iter().chain(&target.missing) {
            out.push_str(&format!("    {}\n", path.display()));
        }
    }
    for warning in &report.warnings {
        out.push_str(&format!("warning: {warning}\n"));
    }
    out
}

/// Handle the `status` command. Read-only; never waits on a running sync.
pub(crate) fn handle_status_command(
    scope: ScopeArg,
    json: bool,
    project_dir: Option<PathBuf>,
) -> Result<()> {
    let report = orchestrator(project_dir)?.status(scope.into())?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", format_status(&report));
    }
    Ok(())
}

/// Handle the `targets` command.
pub(crate) fn handle_targets_command(project_dir: Option<PathBuf>) -> Result<()> {
    let settings = load_settings()?;
    let orch = orchestrator(project_dir)?;
    for name in orch.registry().list() {
        let enabled = settings
            .targets
            .as_ref()
            .is_none_or(|targets| targets.contains(&name));
        println!("{name}{}", if enabled { "" } else { " (disabled)" });
    }
    Ok(())
}
