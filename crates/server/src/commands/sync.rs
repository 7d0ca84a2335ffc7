//! Handler for the `sync` command.

use super::orchestrator;
use crate::cli::SyncArgs;
use anyhow::{bail, Result};
use hsync_state::{load_settings, HsyncSettings};
use hsync_sync::{SyncParams, TargetStatus};
use std::path::PathBuf;
use tracing::warn;

/// CLI flags win over `config.json` and `HSYNC_*` settings.
pub(crate) fn sync_params(args: &SyncArgs, settings: &HsyncSettings) -> SyncParams {
    let targets = if args.targets.is_empty() {
        settings.targets.clone()
    } else {
        Some(args.targets.clone())
    };
    SyncParams {
        scope: args.scope.into(),
        dry_run: args.dry_run,
        force: args.force,
        targets,
        allow_secrets: args.allow_secrets || settings.allow_secrets(),
        parallel: args.parallel || settings.parallel(),
    }
}

/// Handle the `sync` command.
pub(crate) fn handle_sync_command(args: SyncArgs, project_dir: Option<PathBuf>) -> Result<()> {
    let settings = load_settings()?;
    let orch = orchestrator(project_dir)?;
    let params = sync_params(&args, &settings);
    let report = orch.sync(&params)?;

    if !params.dry_run {
        let synced: Vec<String> = report
            .targets
            .iter()
            .filter(|t| matches!(t.status, TargetStatus::Success | TargetStatus::Partial))
            .map(|t| t.target.clone())
            .collect();
        if let Err(e) = orch.prune_backups(&synced, settings.backup_retention()) {
            warn!(error = %format!("{e:#}"), "Backup pruning failed");
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report.format_summary());
    }

    if !report.secrets.is_empty() {
        eprintln!("Possible credentials in MCP definitions:");
        for finding in &report.secrets {
            eprintln!("  - {finding}");
        }
        eprintln!("Move them to environment variables or rerun with --allow-secrets.");
    }
    if !report.success {
        bail!("sync finished with errors");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::ScopeArg;
    use hsync_sync::SyncScope;

    #[test]
    fn flags_override_settings() {
        let settings = HsyncSettings {
            targets: Some(vec!["gemini".into()]),
            parallel: Some(true),
            ..Default::default()
        };
        let args = SyncArgs {
            scope: ScopeArg::User,
            targets: vec!["codex".into()],
            ..Default::default()
        };
        let params = sync_params(&args, &settings);
        assert_eq!(params.scope, SyncScope::User);
        assert_eq!(params.targets, Some(vec!["codex".to_string()]));
        assert!(params.parallel);
        assert!(!params.allow_secrets);
    }

    #[test]
    fn settings_targets_apply_when_none_given() {
        let settings = HsyncSettings {
            targets: Some(vec!["opencode".into()]),
            allow_secrets: Some(true),
            ..Default::default()
        };
        let params = sync_params(&SyncArgs::default(), &settings);
        assert_eq!(params.targets, Some(vec!["opencode".to_string()]));
        assert!(params.allow_secrets);
        assert_eq!(params.scope, SyncScope::All);
    }
}
