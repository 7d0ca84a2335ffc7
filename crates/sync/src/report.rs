//! Sync reporting types for tracking what was synced, skipped and failed.

use crate::common::{SyncScope, TransportKind};
use crate::preview::FileDiff;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Reasons why an item was skipped during sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SkipReason {
    /// The target cannot run this MCP transport
    UnsupportedTransport {
        server: String,
        transport: TransportKind,
        target: String,
    },
    /// Item cannot be expressed in the target format
    NotRepresentable { item: String, reason: String },
    /// Rendered output identical to what is already on disk
    Unchanged { item: String },
    /// Parse error in source file
    ParseError { item: String, error: String },
    /// A same-named entry exists on the target and was not created by hsync
    Unmanaged { item: String, path: PathBuf },
    /// Project-level item but the run has no project directory
    NoProjectDir { item: String },
}

impl SkipReason {
    /// Returns a human-readable description of the skip reason.
    pub fn description(&self) -> String {
        match self {
            Self::UnsupportedTransport {
                server,
                transport,
                target,
            } => format!("MCP server '{server}' uses {transport}, which {target} does not support"),
            Self::NotRepresentable { item, reason } => format!("{item}: {reason}"),
            Self::Unchanged { item } => format!("{item} unchanged"),
            Self::ParseError { item, error } => format!("Failed to parse {item}: {error}"),
            Self::Unmanaged { item, path } => {
                format!("{item} already exists at {} and is not managed", path.display())
            }
            Self::NoProjectDir { item } => format!("{item} needs a project directory"),
        }
    }

    /// Returns actionable guidance for the user.
    pub fn guidance(&self) -> Option<&str> {
        match self {
            Self::UnsupportedTransport { .. } => {
                Some("Use a stdio wrapper or a transport the target supports")
            }
            Self::NotRepresentable { .. } => Some("Configure this item in the target manually"),
            Self::Unchanged { .. } => None,
            Self::ParseError { .. } => Some("Fix the source file syntax"),
            Self::Unmanaged { .. } => Some("Remove or rename the existing target entry to let hsync manage it"),
            Self::NoProjectDir { .. } => Some("Run from a project or pass --project-dir"),
        }
    }

    pub fn is_unchanged(&self) -> bool {
        matches!(self, Self::Unchanged { .. })
    }
}

/// An item that could not be written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedItem {
    pub item: String,
    pub error: String,
}

/// Result of one adapter capability call (`sync_rules`, `sync_mcp`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    /// Items written in this call
    pub synced: usize,
    /// Of `synced`, how many needed format translation
    pub adapted: usize,
    pub skipped: Vec<SkipReason>,
    pub failed: Vec<FailedItem>,
    /// Non-fatal warnings
    pub warnings: Vec<String>,
    /// Managed item ids present on the target after this call
    pub items: Vec<String>,
    /// Target files written or verified, hashed afterwards for drift detection
    pub files: Vec<PathBuf>,
    /// Stale item ids removed in this call
    pub removed: Vec<String>,
}

impl SyncResult {
    pub fn skip(&mut self, reason: SkipReason) {
        self.skipped.push(reason);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn fail(&mut self, item: impl Into<String>, error: impl ToString) {
        self.failed.push(FailedItem {
            item: item.into(),
            error: error.to_string(),
        });
    }

    pub fn track(&mut self, item: impl Into<String>) {
        self.items.push(item.into());
    }

    pub fn merge(&mut self, other: SyncResult) {
        self.synced += other.synced;
        self.adapted += other.adapted;
        self.skipped.extend(other.skipped);
        self.failed.extend(other.failed);
        self.warnings.extend(other.warnings);
        self.items.extend(other.items);
        self.files.extend(other.files);
        self.removed.extend(other.removed);
    }

    /// Skips other than "unchanged".
    pub fn real_skips(&self) -> impl Iterator<Item = &SkipReason> {
        self.skipped.iter().filter(|s| !s.is_unchanged())
    }
}

/// Final state of one target in a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    #[default]
    Success,
    /// Written, but some items failed
    Partial,
    /// Rolled back
    Failed,
    /// Snapshot hash matched the last sync
    NoChange,
    /// Another sync holds the lock
    Busy,
    DryRun,
    /// Secrets were found and the run was not allowed to write them
    Blocked,
}

impl TargetStatus {
    pub fn is_failure(self) -> bool {
        matches!(self, TargetStatus::Failed | TargetStatus::Blocked)
    }
}

/// Per-target breakdown of a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetReport {
    pub target: String,
    pub status: TargetStatus,
    pub rules: SyncResult,
    pub skills: SyncResult,
    pub agents: SyncResult,
    pub commands: SyncResult,
    pub mcp: SyncResult,
    pub settings: SyncResult,
    #[serde(default)]
    pub error: Option<String>,
    /// Backup taken before the write phase
    #[serde(default)]
    pub backup: Option<PathBuf>,
    /// Target files changed outside hsync since the last sync
    #[serde(default)]
    pub drift: Vec<String>,
    /// Dry runs only: what a real sync would change on disk
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preview: Vec<FileDiff>,
}

impl TargetReport {
    pub fn new(target: impl Into<String>, status: TargetStatus) -> Self {
        Self {
            target: target.into(),
            status,
            ..Default::default()
        }
    }

    pub fn sections(&self) -> [(&'static str, &SyncResult); 6] {
        [
            ("rules", &self.rules),
            ("skills", &self.skills),
            ("agents", &self.agents),
            ("commands", &self.commands),
            ("mcp", &self.mcp),
            ("settings", &self.settings),
        ]
    }

    pub fn sections_mut(&mut self) -> [&mut SyncResult; 6] {
        [
            &mut self.rules,
            &mut self.skills,
            &mut self.agents,
            &mut self.commands,
            &mut self.mcp,
            &mut self.settings,
        ]
    }

    pub fn total_synced(&self) -> usize {
        self.sections().iter().map(|(_, r)| r.synced).sum()
    }

    pub fn total_skipped(&self) -> usize {
        self.sections().iter().map(|(_, r)| r.real_skips().count()).sum()
    }

    pub fn total_failed(&self) -> usize {
        self.sections().iter().map(|(_, r)| r.failed.len()).sum()
    }

    pub fn warnings(&self) -> impl Iterator<Item = &String> {
        self.sections()
            .into_iter()
            .flat_map(|(_, r)| r.warnings.iter())
            .chain(self.drift.iter())
    }
}

/// Complete report of one orchestrator run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncReport {
    pub scope: SyncScope,
    pub dry_run: bool,
    pub targets: Vec<TargetReport>,
    /// Source read warnings
    pub warnings: Vec<String>,
    /// Secret findings that blocked the run
    pub secrets: Vec<String>,
    /// Overall success status
    pub success: bool,
    /// Summary message
    pub summary: String,
}

impl SyncReport {
    pub fn target(&self, name: &str) -> Option<&TargetReport> {
        self.targets.iter().find(|t| t.target == name)
    }

    /// Returns total items synced across all targets.
    pub fn total_synced(&self) -> usize {
        self.targets.iter().map(TargetReport::total_synced).sum()
    }

    /// Returns total items skipped across all targets.
    pub fn total_skipped(&self) -> usize {
        self.targets.iter().map(TargetReport::total_skipped).sum()
    }

    /// Generates a formatted summary for display.
    pub fn format_summary(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "Sync {} (scope: {}){}\n",
            if self.success { "complete" } else { "finished with errors" },
            self.scope,
            if self.dry_run { " [dry run]" } else { "" }
        ));
        for target in &self.targets {
            out.push_str(&format!(
                "  {:<10} {:<9} {} synced, {} skipped, {} failed\n",
                target.target,
                format!("{:?}", target.status).to_lowercase(),
                target.total_synced(),
                target.total_skipped(),
                target.total_failed()
            ));
            if let Some(err) = &target.error {
                out.push_str(&format!("    error: {err}\n"));
            }
            for file in &target.preview {
                out.push_str(&format!("    {} {}\n", file.change.as_str(), file.path.display()));
                for line in file.diff.lines() {
                    out.push_str(&format!("      {line}\n"));
                }
            }
            for (section, result) in target.sections() {
                for skip in result.real_skips() {
                    out.push_str(&format!("    skipped {section}: {}\n", skip.description()));
                }
                for failed in &result.failed {
                    out.push_str(&format!(
                        "    failed {section}: {} ({})\n",
                        failed.item, failed.error
                    ));
                }
            }
        }
        for finding in &self.secrets {
            out.push_str(&format!("  secret: {finding}\n"));
        }
        if !self.secrets.is_empty() {
            out.push_str("  Re-run with --allow-secrets to sync literal credentials.\n");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_accumulates_everything() {
        let mut a = SyncResult {
            synced: 1,
            items: vec!["skill:a".into()],
            ..Default::default()
        };
        let mut b = SyncResult::default();
        b.synced = 2;
        b.adapted = 1;
        b.warn("careful");
        b.skip(SkipReason::Unchanged { item: "x".into() });
        b.fail("y", "boom");
        a.merge(b);

        assert_eq!(a.synced, 3);
        assert_eq!(a.adapted, 1);
        assert_eq!(a.warnings, vec!["careful"]);
        assert_eq!(a.failed.len(), 1);
        assert_eq!(a.real_skips().count(), 0);
    }

    #[test]
    fn unchanged_skips_are_not_counted_as_skipped() {
        let mut report = TargetReport::new("codex", TargetStatus::Success);
        report.skills.skip(SkipReason::Unchanged { item: "a".into() });
        report.mcp.skip(SkipReason::UnsupportedTransport {
            server: "s".into(),
            transport: TransportKind::Sse,
            target: "codex".into(),
        });
        assert_eq!(report.total_skipped(), 1);
    }

    #[test]
    fn summary_lists_targets_and_reasons() {
        let mut target = TargetReport::new("opencode", TargetStatus::Partial);
        target.mcp.synced = 1;
        target.mcp.skip(SkipReason::UnsupportedTransport {
            server: "events".into(),
            transport: TransportKind::Sse,
            target: "opencode".into(),
        });
        let report = SyncReport {
            success: true,
            targets: vec![target],
            ..Default::default()
        };
        let summary = report.format_summary();
        assert!(summary.contains("opencode"));
        assert!(summary.contains("1 synced, 1 skipped, 0 failed"));
        assert!(summary.contains("events"));
        assert!(summary.contains("sse"));
    }

    #[test]
    fn dry_run_summary_includes_file_diffs() {
        let mut target = TargetReport::new("codex", TargetStatus::DryRun);
        target.preview.push(FileDiff {
            path: PathBuf::from("/home/u/.codex/AGENTS.md"),
            change: crate::preview::ChangeKind::Modified,
            diff: "@@ -1 +1 @@\n-old\n+new\n".into(),
        });
        let report = SyncReport {
            dry_run: true,
            success: true,
            targets: vec![target],
            ..Default::default()
        };
        let summary = report.format_summary();
        assert!(summary.contains("modified /home/u/.codex/AGENTS.md"));
        assert!(summary.contains("      +new"));
    }

    #[test]
    fn skip_reason_serializes_with_type_tag() {
        let json = serde_json::to_value(SkipReason::Unchanged { item: "a".into() }).unwrap();
        assert_eq!(json["type"], "Unchanged");
        assert!(SkipReason::Unchanged { item: "a".into() }.guidance().is_none());
    }
}
