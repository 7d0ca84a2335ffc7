//! One-way sync of Claude Code configuration into Codex, Gemini CLI and OpenCode.
//!
//! The [`SourceReader`] builds a scope-tagged [`ConfigSnapshot`] from
//! `~/.claude`, the project tree and installed plugins. The
//! [`SyncOrchestrator`] compares its hash with the persisted state and hands
//! it to every registered [`TargetAdapter`], backing each target up first and
//! restoring it if the adapter fails.
//!
//! # Examples
//!
//! ```no_run
//! use hsync_sync::{SyncOrchestrator, SyncParams, SyncScope};
//!
//! let orchestrator = SyncOrchestrator::from_env(std::env::current_dir().ok())?;
//! let report = orchestrator.sync(&SyncParams {
//!     scope: SyncScope::User,
//!     dry_run: true,
//!     ..Default::default()
//! })?;
//! println!("{}", report.format_summary());
//! # Ok::<(), anyhow::Error>(())
//! ```

#![deny(unsafe_code)]

pub type Error = anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;

pub mod adapters;
pub mod backup;
pub mod common;
pub mod error;
pub mod frontmatter;
pub mod lock;
pub mod orchestrator;
pub mod preview;
pub mod registry;
pub mod report;
pub mod secrets;
pub mod source;

pub use adapters::{CodexAdapter, GeminiAdapter, OpenCodeAdapter, SyncContext, TargetAdapter};
pub use backup::{BackupManager, BackupRecord};
pub use common::{
    AgentDef, CommandDef, ConfigSnapshot, McpServer, McpTransport, Permissions, RuleSource,
    Scope, Settings, SkillRef, SyncScope, TargetLevel, TransportKind,
};
pub use error::SyncError;
pub use lock::{LockGuard, SyncLocks};
pub use orchestrator::{StatusReport, SyncOrchestrator, SyncParams, TargetState};
pub use preview::{ChangeKind, FileDiff};
pub use registry::AdapterRegistry;
pub use report::{SkipReason, SyncReport, SyncResult, TargetReport, TargetStatus};
pub use secrets::SecretFinding;
pub use source::{SourceConfig, SourceReader};
