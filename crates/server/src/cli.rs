use clap::{Args, Parser, Subcommand, ValueEnum};
use hsync_sync::SyncScope;
use std::path::PathBuf;

/// Which configuration tiers to sync.
#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub enum ScopeArg {
    /// `~/.claude` and installed plugins.
    User,
    /// The project's shared files (`CLAUDE.md`, `.mcp.json`, `.claude/`).
    Project,
    /// Project-private settings and MCP servers.
    Local,
    /// Everything above.
    #[default]
    All,
}

impl From<ScopeArg> for SyncScope {
    fn from(scope: ScopeArg) -> Self {
        match scope {
            ScopeArg::User => SyncScope::User,
            ScopeArg::Project => SyncScope::Project,
            ScopeArg::Local => SyncScope::Local,
            ScopeArg::All => SyncScope::All,
        }
    }
}

/// Command-line interface for the `hsync` application.
#[derive(Debug, Parser)]
#[command(
    name = "hsync",
    version,
    about = "One-way sync of Claude Code configuration into Codex, Gemini CLI and OpenCode"
)]
pub struct Cli {
    /// Project root (defaults to `CLAUDE_PROJECT_DIR`, then the current directory).
    #[arg(long, global = true, value_name = "DIR")]
    pub project_dir: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available `hsync` commands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Syncs rules, skills, agents, commands, MCP servers and settings to the targets.
    Sync(SyncArgs),
    /// Shows last sync time, source drift and target drift per target.
    Status {
        #[arg(long, value_enum, default_value_t = ScopeArg::All)]
        scope: ScopeArg,
        /// Emits JSON instead of text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Lists registered targets.
    Targets,
    /// Manages target backups.
    Backup {
        #[command(subcommand)]
        action: BackupCommands,
    },
    /// PostToolUse hook: reads the tool event from stdin and syncs on config edits.
    Hook,
    /// Serves newline-delimited JSON requests on stdin/stdout.
    Serve,
}

#[derive(Debug, Clone, Default, Args)]
pub struct SyncArgs {
    #[arg(long, value_enum, default_value_t = ScopeArg::All)]
    pub scope: ScopeArg,
    /// Target to sync (repeatable or comma separated; default: all enabled targets).
    #[arg(long = "target", value_name = "NAME", value_delimiter = ',')]
    pub targets: Vec<String>,
    /// Previews counts and incompatibilities without writing anything.
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
    /// Syncs even when the source is unchanged since the last run.
    #[arg(long, default_value_t = false)]
    pub force: bool,
    /// Writes MCP definitions even when they appear to hold literal credentials.
    #[arg(long, default_value_t = false)]
    pub allow_secrets: bool,
    /// Syncs targets in parallel.
    #[arg(long, default_value_t = false)]
    pub parallel: bool,
    /// Emits the full report as JSON.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Debug, Subcommand)]
pub enum BackupCommands {
    /// Lists backups of a target, newest first.
    List {
        #[arg(long, value_name = "NAME")]
        target: String,
    },
    /// Deletes all but the newest backups.
    Prune {
        /// Target to prune (repeatable; default: every target).
        #[arg(long = "target", value_name = "NAME")]
        targets: Vec<String>,
        /// Backups to keep per target (default: `backup_retention`, 10).
        #[arg(long)]
        keep: Option<usize>,
    },
}
