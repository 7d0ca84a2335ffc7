//! Pre-write backups of target files, used for rollback and kept until pruned.
//!
//! Layout: `<state root>/backups/<target>/<timestamp>/` holding `manifest.json`
//! and one stored copy per backed-up path. Symlinks are recorded, not followed.

use crate::adapters::links::{make_symlink, remove_entry};
use crate::Result;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const MANIFEST: &str = "manifest.json";

/// What a path looked like before the write phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackupEntry {
    /// Did not exist; restoring removes whatever was created.
    Missing { original: PathBuf },
    File { original: PathBuf, stored: String },
    Dir { original: PathBuf, stored: String },
    Symlink { original: PathBuf, points_to: PathBuf },
}

impl BackupEntry {
    pub fn original(&self) -> &Path {
        match self {
            Self::Missing { original }
            | Self::File { original, .. }
            | Self::Dir { original, .. }
            | Self::Symlink { original, .. } => original,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub target: String,
    pub created_at: String,
    pub entries: Vec<BackupEntry>,
    /// Directory holding this backup. Not serialized.
    #[serde(skip)]
    pub dir: PathBuf,
}

/// Creates, restores and prunes target backups.
#[derive(Debug, Clone)]
pub struct BackupManager {
    root: PathBuf,
}

fn timestamp() -> String {
    let now = OffsetDateTime::now_utc();
    format!(
        "{:04}{:02}{:02}T{:02}{:02}{:02}.{:06}Z",
        now.year(),
        u8::from(now.month()),
        now.day(),
        now.hour(),
        now.minute(),
        now.second(),
        now.microsecond()
    )
}

/// Copies a tree without following symlinks.
pub(crate) fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.with_context(|| format!("Failed to walk {}", src.display()))?;
        let rel = entry.path().strip_prefix(src).unwrap_or(entry.path());
        let out = dst.join(rel);
        let file_type = entry.file_type();
        if file_type.is_symlink() {
            let points_to = fs::read_link(entry.path())?;
            make_symlink(&points_to, &out)
                .with_context(|| format!("Failed to recreate link {}", out.display()))?;
        } else if file_type.is_dir() {
            fs::create_dir_all(&out)?;
        } else {
            fs::copy(entry.path(), &out)
                .with_context(|| format!("Failed to copy {}", entry.path().display()))?;
        }
    }
    Ok(())
}

fn restore_entry(backup_dir: &Path, entry: &BackupEntry) -> Result<()> {
    let original = entry.original();
    if fs::symlink_metadata(original).is_ok() {
        remove_entry(original)?;
    }
    if let Some(parent) = original.parent() {
        if !matches!(entry, BackupEntry::Missing { .. }) {
            fs::create_dir_all(parent)?;
        }
    }
    match entry {
        BackupEntry::Missing { .. } => {}
        BackupEntry::Symlink { points_to, .. } => make_symlink(points_to, original)
            .with_context(|| format!("Failed to restore link {}", original.display()))?,
        BackupEntry::Dir { stored, .. } => copy_tree(&backup_dir.join(stored), original)?,
        BackupEntry::File { stored, .. } => {
            let stored = backup_dir.join(stored);
            let bytes = fs::read(&stored)
                .with_context(|| format!("Failed to read {}", stored.display()))?;
            hsync_state::write_atomic(original, &bytes)?;
        }
    }
    Ok(())
}

impl BackupManager {
    /// Backups live under `<state_root>/backups`.
    pub fn new(state_root: &Path) -> Self {
        Self {
            root: state_root.join("backups"),
        }
    }

    pub fn target_dir(&self, target: &str) -> PathBuf {
        self.root.join(target)
    }

    fn fresh_dir(&self, target: &str) -> Result<PathBuf> {
        let base = self.target_dir(target);
        let stamp = timestamp();
        let mut dir = base.join(&stamp);
        let mut n = 1;
        while dir.exists() {
            dir = base.join(format!("{stamp}-{n}"));
            n += 1;
        }
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create backup dir {}", dir.display()))?;
        Ok(dir)
    }

    /// Records the current state of `paths` for `target`.
    pub fn backup(&self, target: &str, paths: &[PathBuf]) -> Result<BackupRecord> {
        let dir = self.fresh_dir(target)?;
        let mut entries = Vec::with_capacity(paths.len());
        for (i, path) in paths.iter().enumerate() {
            let stored = format!("{i:03}");
            let entry = match fs::symlink_metadata(path) {
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => BackupEntry::Missing {
                    original: path.clone(),
                },
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to inspect {}", path.display()))
                }
                Ok(meta) if meta.file_type().is_symlink() => BackupEntry::Symlink {
                    original: path.clone(),
                    points_to: fs::read_link(path)?,
                },
                Ok(meta) if meta.is_dir() => {
                    copy_tree(path, &dir.join(&stored))?;
                    BackupEntry::Dir {
                        original: path.clone(),
                        stored,
                    }
                }
                Ok(_) => {
                    fs::copy(path, dir.join(&stored))
                        .with_context(|| format!("Failed to back up {}", path.display()))?;
                    BackupEntry::File {
                        original: path.clone(),
                        stored,
                    }
                }
            };
            entries.push(entry);
        }

        let record = BackupRecord {
            target: target.to_string(),
            created_at: hsync_state::now_rfc3339()?,
            entries,
            dir: dir.clone(),
        };
        hsync_state::write_atomic(&dir.join(MANIFEST), &serde_json::to_vec_pretty(&record)?)?;
        debug!(target = %target, dir = %dir.display(), paths = paths.len(), "Backup created");
        Ok(record)
    }

    /// Loads a backup from its directory.
    pub fn load(&self, dir: &Path) -> Result<BackupRecord> {
        let manifest = dir.join(MANIFEST);
        let text = fs::read_to_string(&manifest)
            .with_context(|| format!("Failed to read {}", manifest.display()))?;
        let mut record: BackupRecord = serde_json::from_str(&text)
            .with_context(|| format!("Malformed backup manifest {}", manifest.display()))?;
        record.dir = dir.to_path_buf();
        Ok(record)
    }

    /// Puts every recorded path back the way it was.
    ///
    /// Every entry is attempted even when an earlier one fails; the error
    /// lists each path that could not be restored.
    pub fn restore(&self, record: &BackupRecord) -> Result<()> {
        let failures: Vec<String> = record
            .entries
            .iter()
            .filter_map(|entry| {
                restore_entry(&record.dir, entry).err().map(|e| {
                    warn!(path = %entry.original().display(), error = %format!("{e:#}"), "Failed to restore entry");
                    format!("{}: {e:#}", entry.original().display())
                })
            })
            .collect();
        if !failures.is_empty() {
            anyhow::bail!(
                "Restored {} of {} paths from {}; failed: {}",
                record.entries.len() - failures.len(),
                record.entries.len(),
                record.dir.display(),
                failures.join("; ")
            );
        }
        info!(target = %record.target, dir = %record.dir.display(), "Restored backup");
        Ok(())
    }

    /// Backup directories of `target`, newest first.
    pub fn list(&self, target: &str) -> Result<Vec<PathBuf>> {
        let dir = self.target_dir(target);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut dirs: Vec<PathBuf> = fs::read_dir(&dir)
            .with_context(|| format!("Failed to list {}", dir.display()))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.join(MANIFEST).is_file())
            .collect();
        dirs.sort();
        dirs.reverse();
        Ok(dirs)
    }

    /// Deletes all but the `keep` newest backups. Returns how many were removed.
    pub fn prune(&self, target: &str, keep: usize) -> Result<usize> {
        let mut removed = 0;
        for old in self.list(target)?.into_iter().skip(keep) {
            match fs::remove_dir_all(&old) {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %old.display(), error = %e, "Failed to prune backup"),
            }
        }
        Ok(removed)
    }
}
