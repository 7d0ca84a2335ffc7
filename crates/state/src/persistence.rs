//! Persisted sync state: one JSON document per profile, one record per `(target, scope)`.

use crate::atomic::write_atomic;
use anyhow::{Context, Result};
use fs4::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::warn;

pub const STATE_VERSION: u32 = 1;

/// Anything that can be reduced to a stable content hash for change detection.
pub trait Fingerprint {
    fn content_hash(&self) -> String;
}

impl Fingerprint for str {
    fn content_hash(&self) -> String {
        self.to_string()
    }
}

/// Outcome of the last sync attempt for a `(target, scope)` pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    #[default]
    Success,
    /// Some items failed but the target was written.
    Partial,
    /// The target was rolled back.
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStateRecord {
    /// Hash of the snapshot last written to this target. `None` until a sync lands.
    #[serde(default)]
    pub content_hash: Option<String>,
    #[serde(default)]
    pub last_synced_at: Option<String>,
    #[serde(default)]
    pub last_attempt_at: Option<String>,
    #[serde(default)]
    pub status: SyncStatus,
    /// Identifiers of managed items present on the target (`skill:<name>`, `mcp:<name>`, ...).
    #[serde(default)]
    pub synced_items: Vec<String>,
    /// Target file path to sha256, captured after the write phase.
    #[serde(default)]
    pub target_files: BTreeMap<PathBuf, String>,
    #[serde(default)]
    pub synced: usize,
    #[serde(default)]
    pub skipped: usize,
    #[serde(default)]
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDocument {
    pub version: u32,
    pub profile: String,
    #[serde(default)]
    pub last_sync: Option<String>,
    #[serde(default)]
    pub targets: BTreeMap<String, SyncStateRecord>,
}

impl StateDocument {
    fn empty(profile: &str) -> Self {
        Self {
            version: STATE_VERSION,
            profile: profile.to_string(),
            last_sync: None,
            targets: BTreeMap::new(),
        }
    }
}

/// Builds the document key for a `(target, scope)` pair.
pub fn state_key(target: &str, scope: &str) -> String {
    format!("{target}:{scope}")
}

/// Returns the current UTC time as an RFC 3339 string.
pub fn now_rfc3339() -> Result<String> {
    Ok(OffsetDateTime::now_utc().format(&Rfc3339)?)
}

/// Loads, queries and atomically persists the state document for one profile.
#[derive(Debug)]
pub struct StateManager {
    path: PathBuf,
    lock_path: PathBuf,
    doc: StateDocument,
    recovery: Option<StateRecovery>,
    quarantine: bool,
}

impl StateManager {
    /// Opens the state document for `profile` under `state_root`.
    ///
    /// A missing document yields empty state. A corrupt one is moved aside and
    /// also yields empty state, which forces a full resync.
    pub fn open(state_root: &Path, profile: &str) -> Result<Self> {
        Self::open_with(state_root, profile, true)
    }

    /// Like [`StateManager::open`], but an unreadable document is only
    /// reported, never moved. For callers that must not touch the disk.
    pub fn inspect(state_root: &Path, profile: &str) -> Result<Self> {
        Self::open_with(state_root, profile, false)
    }

    fn open_with(state_root: &Path, profile: &str, quarantine: bool) -> Result<Self> {
        let file_name = if profile == "default" {
            "state.json".to_string()
        } else {
            format!("state-{profile}.json")
        };
        let mut manager = Self {
            path: state_root.join(file_name),
            lock_path: state_root.join("locks").join("state.lock"),
            doc: StateDocument::empty(profile),
            recovery: None,
            quarantine,
        };
        manager.load()?;
        Ok(manager)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn document(&self) -> &StateDocument {
        &self.doc
    }

    /// Set when the document on disk could not be read and empty state was used instead.
    pub fn recovery(&self) -> Option<&StateRecovery> {
        self.recovery.as_ref()
    }

    /// Re-reads the document from disk.
    pub fn load(&mut self) -> Result<&StateDocument> {
        let (doc, recovery) = read_document(&self.path, &self.doc.profile, self.quarantine);
        self.doc = doc;
        if recovery.is_some() {
            self.recovery = recovery;
        }
        Ok(&self.doc)
    }

    /// Atomically writes the in-memory document.
    pub fn save(&self) -> Result<()> {
        let json = serde_json::to_vec_pretty(&self.doc)?;
        write_atomic(&self.path, &json)
    }

    pub fn record(&self, target: &str, scope: &str) -> Option<&SyncStateRecord> {
        self.doc.targets.get(&state_key(target, scope))
    }

    /// True when the snapshot differs from what was last written for the pair.
    ///
    /// No prior record, or a record whose sync never landed, always counts as changed.
    pub fn has_changed<F: Fingerprint + ?Sized>(
        &self,
        snapshot: &F,
        target: &str,
        scope: &str,
    ) -> bool {
        match self.record(target, scope).and_then(|r| r.content_hash.as_deref()) {
            Some(previous) => previous != snapshot.content_hash(),
            None => true,
        }
    }

    /// Stores `record` for the pair under the cross-process state lock.
    ///
    /// The document is reloaded inside the lock so concurrent writers for other
    /// pairs are not lost.
    pub fn update(&mut self, target: &str, scope: &str, record: SyncStateRecord) -> Result<()> {
        let _lock = self.lock()?;
        self.load()?;
        self.doc.last_sync = record
            .last_synced_at
            .clone()
            .or_else(|| self.doc.last_sync.clone());
        self.doc.targets.insert(state_key(target, scope), record);
        self.save()
    }

    /// Drops every record for `target`. Returns how many were removed.
    pub fn remove_target(&mut self, target: &str) -> Result<usize> {
        let _lock = self.lock()?;
        self.load()?;
        let prefix = format!("{target}:");
        let before = self.doc.targets.len();
        self.doc.targets.retain(|key, _| !key.starts_with(&prefix));
        let removed = before - self.doc.targets.len();
        if removed > 0 {
            self.save()?;
        }
        Ok(removed)
    }

    /// Time of the most recent successful sync across all pairs.
    pub fn last_sync(&self) -> Option<OffsetDateTime> {
        self.doc
            .last_sync
            .as_deref()
            .and_then(|s| OffsetDateTime::parse(s, &Rfc3339).ok())
    }

    /// True when the last sync finished less than `window` ago.
    pub fn should_debounce(&self, window: Duration) -> bool {
        let Some(last) = self.last_sync() else {
            return false;
        };
        let elapsed = OffsetDateTime::now_utc() - last;
        elapsed.is_positive() && elapsed.unsigned_abs() < window
    }

    fn lock(&self) -> Result<fs::File> {
        if let Some(parent) = self.lock_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)
            .with_context(|| format!("Failed to open {}", self.lock_path.display()))?;
        file.lock_exclusive()
            .with_context(|| format!("Failed to lock {}", self.lock_path.display()))?;
        Ok(file)
    }
}

/// Why an existing state file was discarded in favour of empty state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateRecovery {
    pub path: PathBuf,
    /// Where the unreadable file was moved, when the move succeeded.
    pub moved_to: Option<PathBuf>,
    pub message: String,
}

/// Reads the document. Anything that is not a readable state document is
/// replaced by empty state (and moved aside when `quarantine` is set); only a
/// missing file is silent.
fn read_document(
    path: &Path,
    profile: &str,
    quarantine: bool,
) -> (StateDocument, Option<StateRecovery>) {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return (StateDocument::empty(profile), None);
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "State file is unreadable; starting from empty state");
            let recovery = StateRecovery {
                path: path.to_path_buf(),
                moved_to: None,
                message: e.to_string(),
            };
            return (StateDocument::empty(profile), Some(recovery));
        }
    };
    let parsed = std::str::from_utf8(&bytes)
        .map_err(|e| e.to_string())
        .and_then(|text| serde_json::from_str::<StateDocument>(text).map_err(|e| e.to_string()));
    match parsed {
        Ok(doc) => (doc, None),
        Err(message) if !quarantine => {
            warn!(path = %path.display(), error = %message, "State file is corrupt; reading as empty state");
            let recovery = StateRecovery {
                path: path.to_path_buf(),
                moved_to: None,
                message,
            };
            (StateDocument::empty(profile), Some(recovery))
        }
        Err(message) => {
            let aside = path.with_extension("json.corrupt");
            warn!(
                path = %path.display(),
                moved_to = %aside.display(),
                error = %message,
                "State file is corrupt; starting from empty state"
            );
            let moved_to = match fs::rename(path, &aside) {
                Ok(()) => Some(aside),
                Err(rename_err) => {
                    warn!(error = %rename_err, "Could not move corrupt state file aside");
                    None
                }
            };
            let recovery = StateRecovery {
                path: path.to_path_buf(),
                moved_to,
                message,
            };
            (StateDocument::empty(profile), Some(recovery))
        }
    }
}
