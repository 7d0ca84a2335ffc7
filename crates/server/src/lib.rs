//! Command-line surface of hsync: argument parsing, command handlers, the
//! Claude Code PostToolUse hook and the line-delimited JSON service.
//!
//! The binary crate only calls [`run`]; everything user-facing lives here.

#![deny(unsafe_code)]

pub mod cli;
mod commands;
pub mod service;

pub use cli::{BackupCommands, Cli, Commands, ScopeArg, SyncArgs};
pub use service::{Envelope, Request, Response, ResponseStatus, SyncGate, SyncService};

use anyhow::Result;
use clap::Parser;
use commands::{
    handle_backup_list_command, handle_backup_prune_command, handle_hook_command,
    handle_serve_command, handle_status_command, handle_sync_command, handle_targets_command,
    resolve_project_dir,
};

/// Parses the command line and runs the selected command.
///
/// Logs go to stderr (filtered by `RUST_LOG`) so stdout stays free for
/// reports and the `serve` protocol.
pub fn run() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let project_dir = resolve_project_dir(cli.project_dir);
    match cli.command.unwrap_or(Commands::Sync(SyncArgs::default())) {
        Commands::Sync(args) => handle_sync_command(args, project_dir),
        Commands::Status { scope, json } => handle_status_command(scope, json, project_dir),
        Commands::Targets => handle_targets_command(project_dir),
        Commands::Backup { action } => match action {
            BackupCommands::List { target } => handle_backup_list_command(target, project_dir),
            BackupCommands::Prune { targets, keep } => {
                handle_backup_prune_command(targets, keep, project_dir)
            }
        },
        Commands::Hook => handle_hook_command(project_dir),
        Commands::Serve => handle_serve_command(project_dir),
    }
}
