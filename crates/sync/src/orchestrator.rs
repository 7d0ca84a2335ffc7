//! Sync orchestrator: read, diff, back up, dispatch to adapters, record state.
//!
//! Each target runs under its own `(target, scope)` lock with its own backup.
//! An adapter error rolls that target back and marks it failed; the remaining
//! targets carry on.

use crate::adapters::env_vars::{referenced_vars, EnvMap};
use crate::adapters::links::entry_fingerprint;
use crate::adapters::utils::hash_content;
use crate::adapters::{SyncContext, TargetAdapter};
use crate::backup::{BackupManager, BackupRecord};
use crate::common::{ConfigSnapshot, SyncScope};
use crate::error::SyncError;
use crate::lock::SyncLocks;
use crate::preview::Sandbox;
use crate::registry::AdapterRegistry;
use crate::report::{SkipReason, SyncReport, TargetReport, TargetStatus};
use crate::secrets::scan_servers;
use crate::source::{SourceConfig, SourceReader};
use crate::Result;
use hsync_state::{
    now_rfc3339, Fingerprint, StateManager, StateRecovery, SyncStateRecord, SyncStatus,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Parameters for a sync operation.
///
/// ```
/// use hsync_sync::SyncParams;
///
/// let params = SyncParams { dry_run: true, ..Default::default() };
/// assert!(params.dry_run);
/// assert!(params.targets.is_none());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncParams {
    #[serde(default)]
    pub scope: SyncScope,
    /// Preview only: no backups, writes or state changes
    #[serde(default)]
    pub dry_run: bool,
    /// Sync even when the snapshot hash is unchanged
    #[serde(default)]
    pub force: bool,
    /// Targets to sync; `None` means every registered target
    #[serde(default)]
    pub targets: Option<Vec<String>>,
    /// Write literal credentials found in MCP definitions
    #[serde(default)]
    pub allow_secrets: bool,
    /// Dispatch targets on a thread pool
    #[serde(default)]
    pub parallel: bool,
}

/// Drift and history of one target, as reported by [`SyncOrchestrator::status`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetState {
    pub target: String,
    pub last_synced_at: Option<String>,
    pub status: Option<SyncStatus>,
    pub items: usize,
    /// The source snapshot differs from what was last written
    pub source_changed: bool,
    /// Recorded target files whose content changed outside hsync
    pub modified: Vec<PathBuf>,
    /// Recorded target files that no longer exist
    pub missing: Vec<PathBuf>,
}

impl TargetState {
    pub fn has_target_drift(&self) -> bool {
        !self.modified.is_empty() || !self.missing.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusReport {
    pub scope: SyncScope,
    pub profile: String,
    pub last_sync: Option<String>,
    pub targets: Vec<TargetState>,
    pub warnings: Vec<String>,
}

/// Snapshot hash extended with the value of every `${VAR}` the MCP servers
/// and settings reference. Targets without interpolation get those values
/// written in, so a changed variable must count as a changed source.
fn run_hash(snapshot: &ConfigSnapshot, env: &EnvMap) -> String {
    let base = snapshot.content_hash();
    let sources = (&snapshot.mcp_servers, &snapshot.settings.env);
    let referenced: BTreeSet<String> = match serde_json::to_string(&sources) {
        Ok(text) => referenced_vars(&text).into_iter().collect(),
        Err(_) => BTreeSet::new(),
    };
    if referenced.is_empty() {
        return base;
    }
    let resolved: Vec<(&str, Option<&str>)> = referenced
        .iter()
        .map(|var| (var.as_str(), env.get(var).map(String::as_str)))
        .collect();
    let mut buf = base.into_bytes();
    buf.push(0);
    buf.extend(serde_json::to_vec(&resolved).unwrap_or_default());
    hash_content(&buf)
}

/// Entries whose current fingerprint differs from the recorded one: `(modified, missing)`.
fn target_drift(record: &SyncStateRecord) -> (Vec<PathBuf>, Vec<PathBuf>) {
    let mut modified = Vec::new();
    let mut missing = Vec::new();
    for (path, recorded) in &record.target_files {
        match entry_fingerprint(path) {
            Ok(Some(current)) if &current == recorded => {}
            Ok(Some(_)) => modified.push(path.clone()),
            Ok(None) => missing.push(path.clone()),
            Err(e) => {
                warn!(path = %path.display(), error = %format!("{e:#}"), "Cannot fingerprint target entry");
                modified.push(path.clone());
            }
        }
    }
    (modified, missing)
}

fn drift_messages(record: &SyncStateRecord) -> Vec<String> {
    let (modified, missing) = target_drift(record);
    modified
        .iter()
        .map(|p| format!("drift: {} was modified outside hsync", p.display()))
        .chain(missing.iter().map(|p| format!("drift: {} is missing", p.display())))
        .collect()
}

fn fingerprint_files(files: &BTreeSet<PathBuf>) -> BTreeMap<PathBuf, String> {
    files
        .iter()
        .filter_map(|path| match entry_fingerprint(path) {
            Ok(Some(fingerprint)) => Some((path.clone(), fingerprint)),
            _ => None,
        })
        .collect()
}

fn recovery_warning(recovery: &StateRecovery) -> String {
    let err = SyncError::StateCorruption {
        path: recovery.path.clone(),
        message: recovery.message.clone(),
    };
    match &recovery.moved_to {
        Some(aside) => format!("{err}; moved to {} and starting from empty state", aside.display()),
        None => format!("{err}; starting from empty state"),
    }
}

/// Groups target indices so that targets sharing a managed path land in the
/// same group. Groups run concurrently; members of a group run in order.
fn path_groups(paths: &[Vec<PathBuf>]) -> Vec<Vec<usize>> {
    let mut groups: Vec<(Vec<usize>, Vec<PathBuf>)> = Vec::new();
    for (i, own) in paths.iter().enumerate() {
        let overlaps = |other: &Vec<PathBuf>| {
            own.iter()
                .any(|a| other.iter().any(|b| a.starts_with(b) || b.starts_with(a)))
        };
        let (hit, rest): (Vec<_>, Vec<_>) = groups.drain(..).partition(|(_, p)| overlaps(p));
        groups = rest;
        let mut merged = (vec![i], own.clone());
        for (indices, group_paths) in hit {
            merged.0.extend(indices);
            merged.1.extend(group_paths);
        }
        merged.0.sort_unstable();
        groups.push(merged);
    }
    groups.into_iter().map(|(indices, _)| indices).collect()
}

/// Counts and transport incompatibilities of one target, without rendering anything.
fn estimate(adapter: &dyn TargetAdapter, snapshot: &ConfigSnapshot) -> TargetReport {
    let mut report = TargetReport::new(adapter.name(), TargetStatus::DryRun);
    report.rules.synced = snapshot.rules.len();
    report.skills.synced = snapshot.skills.len();
    report.agents.synced = snapshot.agents.len();
    report.commands.synced = snapshot.commands.len();
    report.settings.synced = usize::from(!snapshot.settings.is_empty());
    let supported = adapter.supported_transports();
    for server in snapshot.mcp_servers.values() {
        if supported.contains(&server.kind()) {
            report.mcp.synced += 1;
        } else {
            report.mcp.skip(SkipReason::UnsupportedTransport {
                server: server.name.clone(),
                transport: server.kind(),
                target: adapter.name().to_string(),
            });
        }
    }
    report
}

/// Runs the six capability calls in order, stopping at the first error.
fn dispatch(
    adapter: &dyn TargetAdapter,
    snapshot: &ConfigSnapshot,
    ctx: &SyncContext,
    report: &mut TargetReport,
) -> Result<()> {
    report.rules = adapter.sync_rules(&snapshot.rules, ctx)?;
    report.skills = adapter.sync_skills(&snapshot.skills, ctx)?;
    report.agents = adapter.sync_agents(&snapshot.agents, ctx)?;
    report.commands = adapter.sync_commands(&snapshot.commands, ctx)?;
    report.mcp = adapter.sync_mcp(&snapshot.mcp_servers, ctx)?;
    report.settings = adapter.sync_settings(&snapshot.settings, ctx)?;
    Ok(())
}

/// Coordinates one or more sync runs for a profile.
pub struct SyncOrchestrator {
    reader: SourceReader,
    registry: AdapterRegistry,
    state_root: PathBuf,
    profile: String,
    backups: BackupManager,
    locks: SyncLocks,
    env: EnvMap,
}

impl SyncOrchestrator {
    pub fn new(reader: SourceReader, registry: AdapterRegistry, state_root: impl Into<PathBuf>) -> Self {
        let state_root = state_root.into();
        Self {
            reader,
            registry,
            backups: BackupManager::new(&state_root),
            locks: SyncLocks::new(&state_root),
            state_root,
            profile: "default".to_string(),
            env: std::env::vars().collect(),
        }
    }

    /// Orchestrator for the real home, Claude and state directories.
    pub fn from_env(project_dir: Option<PathBuf>) -> Result<Self> {
        let source = SourceConfig::from_env(project_dir)?;
        let registry = AdapterRegistry::with_defaults(source.home.clone());
        Ok(Self::new(SourceReader::new(source), registry, hsync_state::state_root()?)
            .with_profile(hsync_state::profile()))
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = profile.into();
        self
    }

    /// Environment used to resolve `${VAR}` references for targets without interpolation.
    pub fn with_env(mut self, env: EnvMap) -> Self {
        self.env = env;
        self
    }

    /// Shares lock bookkeeping with a long-running caller.
    pub fn with_locks(mut self, locks: SyncLocks) -> Self {
        self.locks = locks;
        self
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    pub fn backups(&self) -> &BackupManager {
        &self.backups
    }

    pub fn state_root(&self) -> &Path {
        &self.state_root
    }

    fn project_dir(&self) -> Option<PathBuf> {
        self.reader.config().project_dir.clone()
    }

    fn open_state(&self) -> Result<StateManager> {
        StateManager::open(&self.state_root, &self.profile)
    }

    /// State for read-only callers: an unreadable file is reported but left in place.
    fn inspect_state(&self) -> Result<StateManager> {
        StateManager::inspect(&self.state_root, &self.profile)
    }

    fn context(&self, scope: SyncScope, previous: &SyncStateRecord) -> SyncContext {
        SyncContext::new(scope, self.project_dir())
            .with_env(self.env.clone())
            .with_previous_items(previous.synced_items.iter().cloned())
    }

    fn resolve_targets(&self, requested: Option<&[String]>) -> Result<Vec<String>> {
        let Some(requested) = requested else {
            return Ok(self.registry.list());
        };
        let mut names = Vec::new();
        for name in requested {
            let name = name.trim().to_ascii_lowercase();
            if !self.registry.contains(&name) {
                return Err(SyncError::TargetNotFound {
                    name,
                    available: self.registry.list().join(", "),
                }
                .into());
            }
            if !names.contains(&name) {
                names.push(name);
            }
        }
        Ok(names)
    }

    /// Performs the sync operation.
    pub fn sync(&self, params: &SyncParams) -> Result<SyncReport> {
        let targets = self.resolve_targets(params.targets.as_deref())?;
        debug!(scope = %params.scope, targets = ?targets, dry_run = params.dry_run, "Reading source");
        let snapshot = self.reader.read(params.scope);
        let hash = run_hash(&snapshot, &self.env);

        let mut report = SyncReport {
            scope: params.scope,
            dry_run: params.dry_run,
            warnings: snapshot.warnings.clone(),
            ..Default::default()
        };

        let state = if params.dry_run {
            self.inspect_state()?
        } else {
            self.open_state()?
        };
        if let Some(recovery) = state.recovery() {
            report.warnings.push(recovery_warning(recovery));
        }

        let findings = scan_servers(&snapshot.mcp_servers);
        if !findings.is_empty() && !params.allow_secrets {
            warn!(count = findings.len(), "Literal credentials found; sync blocked");
            report.secrets = findings.iter().map(ToString::to_string).collect();
            report.targets = targets
                .iter()
                .map(|t| TargetReport::new(t.clone(), TargetStatus::Blocked))
                .collect();
            report.success = false;
            report.summary = report.format_summary();
            return Ok(report);
        }

        let run = |name: &String| self.sync_target(name, &snapshot, &hash, params);
        report.targets = if params.parallel {
            self.run_grouped(&targets, params.scope, run)
        } else {
            targets.iter().map(run).collect()
        };
        report.success = !report.targets.iter().any(|t| t.status.is_failure());
        report.summary = report.format_summary();
        Ok(report)
    }

    /// Runs targets on the thread pool, keeping targets that share files in sequence
    /// so one target's rollback cannot undo another's write. Results keep `targets` order.
    fn run_grouped(
        &self,
        targets: &[String],
        scope: SyncScope,
        run: impl Fn(&String) -> TargetReport + Sync,
    ) -> Vec<TargetReport> {
        let ctx = SyncContext::new(scope, self.project_dir()).with_env(EnvMap::new());
        let paths: Vec<Vec<PathBuf>> = targets
            .iter()
            .map(|name| {
                self.registry
                    .get(name)
                    .map(|adapter| adapter.managed_paths(&ctx))
                    .unwrap_or_default()
            })
            .collect();
        let groups = path_groups(&paths);
        debug!(groups = ?groups, "Parallel sync groups");
        let done: Vec<Vec<(usize, TargetReport)>> = groups
            .par_iter()
            .map(|group| group.iter().map(|&i| (i, run(&targets[i]))).collect())
            .collect();
        let mut slots: Vec<Option<TargetReport>> = vec![None; targets.len()];
        for (i, report) in done.into_iter().flatten() {
            slots[i] = Some(report);
        }
        slots.into_iter().flatten().collect()
    }

    /// Syncs one target. Never fails; problems are recorded in the report.
    fn sync_target(
        &self,
        name: &str,
        snapshot: &ConfigSnapshot,
        hash: &str,
        params: &SyncParams,
    ) -> TargetReport {
        let adapter = match self.registry.get(name) {
            Ok(adapter) => adapter,
            Err(e) => {
                let mut report = TargetReport::new(name, TargetStatus::Failed);
                report.error = Some(e.to_string());
                return report;
            }
        };
        if params.dry_run {
            return self.dry_run(adapter.as_ref(), snapshot, params);
        }

        let scope = params.scope.as_str();
        let _guard = match self.locks.try_acquire(name, scope) {
            Ok(guard) => guard,
            Err(e) => {
                info!(target = %name, scope = %scope, "Sync already in progress");
                let status = if e.is_busy() { TargetStatus::Busy } else { TargetStatus::Failed };
                let mut report = TargetReport::new(name, status);
                report.error = Some(e.to_string());
                return report;
            }
        };

        match self.write_target(adapter.as_ref(), snapshot, hash, params) {
            Ok(report) => report,
            Err(e) => {
                warn!(target = %name, error = %format!("{e:#}"), "Target sync failed");
                let mut report = TargetReport::new(name, TargetStatus::Failed);
                report.error = Some(format!("{e:#}"));
                report
            }
        }
    }

    /// Dry-run report: rendered diffs when the adapter can be rebuilt in a
    /// scratch home, otherwise counts only.
    fn dry_run(
        &self,
        adapter: &dyn TargetAdapter,
        snapshot: &ConfigSnapshot,
        params: &SyncParams,
    ) -> TargetReport {
        match self.render_preview(adapter, snapshot, params) {
            Ok(Some(report)) => report,
            Ok(None) => estimate(adapter, snapshot),
            Err(e) => {
                warn!(target = %adapter.name(), error = %format!("{e:#}"), "Preview failed");
                let mut report = estimate(adapter, snapshot);
                report.error = Some(format!("preview failed: {e:#}"));
                report
            }
        }
    }

    fn render_preview(
        &self,
        adapter: &dyn TargetAdapter,
        snapshot: &ConfigSnapshot,
        params: &SyncParams,
    ) -> Result<Option<TargetReport>> {
        let name = adapter.name();
        let state = self.inspect_state()?;
        let previous = state
            .record(name, params.scope.as_str())
            .cloned()
            .unwrap_or_default();
        let ctx = self.context(params.scope, &previous);
        let sandbox = Sandbox::new(self.registry.home(), ctx.project_dir())?;
        let Some(scratch) = self.registry.get_under(name, &sandbox.home()) else {
            return Ok(None);
        };
        let pairs = sandbox.mirror(&adapter.managed_paths(&ctx))?;
        let scratch_ctx = SyncContext {
            project_dir: sandbox.project(),
            ..ctx
        };

        let mut report = TargetReport::new(name, TargetStatus::DryRun);
        dispatch(scratch.as_ref(), snapshot, &scratch_ctx, &mut report)?;
        for section in report.sections_mut() {
            for file in section.files.iter_mut() {
                *file = sandbox.to_real(file);
            }
            for warning in section.warnings.iter_mut() {
                *warning = sandbox.unmask(warning);
            }
            for skip in section.skipped.iter_mut() {
                if let SkipReason::Unmanaged { path, .. } = skip {
                    *path = sandbox.to_real(path);
                }
            }
        }
        report.drift = drift_messages(&previous);
        report.preview = sandbox.diff(&pairs)?;
        Ok(Some(report))
    }

    fn write_target(
        &self,
        adapter: &dyn TargetAdapter,
        snapshot: &ConfigSnapshot,
        hash: &str,
        params: &SyncParams,
    ) -> Result<TargetReport> {
        let name = adapter.name();
        let scope = params.scope.as_str();
        let mut state = self.open_state()?;
        let previous = state.record(name, scope).cloned().unwrap_or_default();

        let mut drift = drift_messages(&previous);

        if !params.force && drift.is_empty() && !state.has_changed(hash, name, scope) {
            debug!(target = %name, scope = %scope, "Snapshot unchanged");
            return Ok(TargetReport::new(name, TargetStatus::NoChange));
        }

        let ctx = self.context(params.scope, &previous);
        let backup = self.backups.backup(name, &adapter.managed_paths(&ctx))?;

        let mut report = TargetReport::new(name, TargetStatus::Success);
        report.backup = Some(backup.dir.clone());
        report.drift.append(&mut drift);

        let attempted_at = now_rfc3339()?;
        if let Err(e) = dispatch(adapter, snapshot, &ctx, &mut report) {
            self.rollback(name, &backup);
            let err = SyncError::Write {
                target: name.to_string(),
                message: format!("{e:#}"),
            };
            warn!(target = %name, error = %err, "Adapter failed; target restored");
            report.status = TargetStatus::Failed;
            report.error = Some(err.to_string());
            let record = SyncStateRecord {
                last_attempt_at: Some(attempted_at),
                status: SyncStatus::Failed,
                ..previous
            };
            state.update(name, scope, record)?;
            return Ok(report);
        }

        report.status = if report.total_failed() > 0 {
            TargetStatus::Partial
        } else {
            TargetStatus::Success
        };
        let sections = report.sections();
        let items: BTreeSet<String> = sections
            .iter()
            .flat_map(|(_, r)| r.items.iter().cloned())
            .collect();
        let files: BTreeSet<PathBuf> = sections
            .iter()
            .flat_map(|(_, r)| r.files.iter().cloned())
            .collect();
        let record = SyncStateRecord {
            content_hash: Some(hash.to_string()),
            last_synced_at: Some(attempted_at.clone()),
            last_attempt_at: Some(attempted_at),
            status: match report.status {
                TargetStatus::Partial => SyncStatus::Partial,
                _ => SyncStatus::Success,
            },
            synced_items: items.into_iter().collect(),
            target_files: fingerprint_files(&files),
            synced: report.total_synced(),
            skipped: report.total_skipped(),
            failed: report.total_failed(),
        };
        state.update(name, scope, record)?;
        info!(
            target = %name,
            scope = %scope,
            status = ?report.status,
            synced = report.total_synced(),
            skipped = report.total_skipped(),
            failed = report.total_failed(),
            "Target synced"
        );
        Ok(report)
    }

    fn rollback(&self, target: &str, backup: &BackupRecord) {
        if let Err(e) = self.backups.restore(backup) {
            warn!(
                target = %target,
                backup = %backup.dir.display(),
                error = %format!("{e:#}"),
                "Rollback failed; restore manually from the backup directory"
            );
        }
    }

    /// Read-only drift report; takes no locks and writes nothing.
    pub fn status(&self, scope: SyncScope) -> Result<StatusReport> {
        let snapshot = self.reader.read(scope);
        let hash = run_hash(&snapshot, &self.env);
        let state = self.inspect_state()?;
        let mut warnings = snapshot.warnings;
        if let Some(recovery) = state.recovery() {
            warnings.push(recovery_warning(recovery));
        }
        let targets = self
            .registry
            .list()
            .into_iter()
            .map(|name| {
                let record = state.record(&name, scope.as_str());
                let (modified, missing) = record.map(target_drift).unwrap_or_default();
                TargetState {
                    source_changed: state.has_changed(hash.as_str(), &name, scope.as_str()),
                    last_synced_at: record.and_then(|r| r.last_synced_at.clone()),
                    status: record.map(|r| r.status),
                    items: record.map(|r| r.synced_items.len()).unwrap_or(0),
                    modified,
                    missing,
                    target: name,
                }
            })
            .collect();
        Ok(StatusReport {
            scope,
            profile: self.profile.clone(),
            last_sync: state.document().last_sync.clone(),
            targets,
            warnings,
        })
    }

    /// Deletes all but the `keep` newest backups of each named target.
    pub fn prune_backups(&self, targets: &[String], keep: usize) -> Result<BTreeMap<String, usize>> {
        targets
            .iter()
            .map(|t| Ok((t.clone(), self.backups.prune(t, keep)?)))
            .collect()
    }
}

#[cfg(test)]
mod tests;
