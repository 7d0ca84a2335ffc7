//! Dry-run rendering.
//!
//! The managed paths of a target are mirrored into a scratch directory, the
//! adapter runs against the mirror, and the result is diffed against the real
//! files. Nothing outside the scratch directory is written.

use crate::adapters::links::make_symlink;
use crate::backup::copy_tree;
use crate::Result;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use similar::TextDiff;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;
use walkdir::WalkDir;

const CONTEXT_LINES: usize = 3;

/// How a target entry would change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Added => "added",
            ChangeKind::Modified => "modified",
            ChangeKind::Removed => "removed",
        }
    }
}

/// One target entry a sync would change, with a unified diff of its content.
///
/// Symlinks are shown as a single `symlink -> <target>` line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDiff {
    pub path: PathBuf,
    pub change: ChangeKind,
    pub diff: String,
}

/// Unified diff between the current and the would-be content of `path`.
pub fn unified_diff(path: &Path, current: &str, synced: &str) -> String {
    TextDiff::from_lines(current, synced)
        .unified_diff()
        .context_radius(CONTEXT_LINES)
        .header(
            &format!("current/{}", path.display()),
            &format!("synced/{}", path.display()),
        )
        .to_string()
}

/// Content of every entry under `root`, keyed by path relative to it.
fn entries(root: &Path) -> Result<BTreeMap<PathBuf, String>> {
    let mut out = BTreeMap::new();
    if fs::symlink_metadata(root).is_err() {
        return Ok(out);
    }
    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        let name = entry.file_name().to_string_lossy();
        if name.starts_with(".hsync-source-") || entry.file_type().is_dir() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_path_buf();
        let content = if entry.path_is_symlink() && entry.depth() > 0 {
            format!("symlink -> {}\n", fs::read_link(entry.path())?.display())
        } else {
            String::from_utf8_lossy(&fs::read(entry.path())?).into_owned()
        };
        out.insert(rel, content);
    }
    Ok(out)
}

/// Scratch copy of a target's home and project roots.
pub(crate) struct Sandbox {
    dir: TempDir,
    /// `(real root, scratch root)`, most specific first.
    roots: Vec<(PathBuf, PathBuf)>,
    project: Option<PathBuf>,
}

impl Sandbox {
    pub(crate) fn new(home: &Path, project: Option<&Path>) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("hsync-preview-")
            .tempdir()
            .context("Failed to create preview directory")?;
        let scratch_home = dir.path().join("home");
        fs::create_dir_all(&scratch_home)?;
        let mut roots = vec![(home.to_path_buf(), scratch_home)];
        let scratch_project = match project {
            Some(project) => {
                let scratch = dir.path().join("project");
                fs::create_dir_all(&scratch)?;
                roots.push((project.to_path_buf(), scratch.clone()));
                Some(scratch)
            }
            None => None,
        };
        roots.sort_by_key(|(real, _)| std::cmp::Reverse(real.components().count()));
        Ok(Self {
            dir,
            roots,
            project: scratch_project,
        })
    }

    pub(crate) fn home(&self) -> PathBuf {
        self.dir.path().join("home")
    }

    pub(crate) fn project(&self) -> Option<PathBuf> {
        self.project.clone()
    }

    fn to_scratch(&self, real: &Path) -> Option<PathBuf> {
        self.roots.iter().find_map(|(root, scratch)| {
            real.strip_prefix(root).ok().map(|rel| join(scratch, rel))
        })
    }

    /// Maps a scratch path back to the real path it stands for.
    pub(crate) fn to_real(&self, scratch_path: &Path) -> PathBuf {
        self.roots
            .iter()
            .find_map(|(root, scratch)| {
                scratch_path.strip_prefix(scratch).ok().map(|rel| join(root, rel))
            })
            .unwrap_or_else(|| scratch_path.to_path_buf())
    }

    /// Rewrites scratch paths mentioned in a message to their real paths.
    pub(crate) fn unmask(&self, message: &str) -> String {
        self.roots.iter().fold(message.to_string(), |acc, (root, scratch)| {
            acc.replace(&scratch.display().to_string(), &root.display().to_string())
        })
    }

    /// Copies the current state of `paths` into the scratch roots.
    ///
    /// Returns `(real, scratch)` pairs; paths outside the known roots are skipped.
    pub(crate) fn mirror(&self, paths: &[PathBuf]) -> Result<Vec<(PathBuf, PathBuf)>> {
        let mut pairs = Vec::new();
        let mut seen = BTreeSet::new();
        for real in paths {
            let Some(scratch) = self.to_scratch(real) else {
                debug!(path = %real.display(), "Managed path outside home and project; not previewed");
                continue;
            };
            if !seen.insert(real.clone()) {
                continue;
            }
            if fs::symlink_metadata(&scratch).is_err() {
                copy_entry(real, &scratch)?;
            }
            pairs.push((real.clone(), scratch));
        }
        Ok(pairs)
    }

    /// Differences between each real path and its rendered scratch copy.
    pub(crate) fn diff(&self, pairs: &[(PathBuf, PathBuf)]) -> Result<Vec<FileDiff>> {
        let mut diffs = Vec::new();
        for (real, scratch) in pairs {
            let before = entries(real)?;
            let after = entries(scratch)?;
            let keys: BTreeSet<&PathBuf> = before.keys().chain(after.keys()).collect();
            for rel in keys {
                let old = before.get(rel);
                let new = after.get(rel);
                let change = match (old, new) {
                    (Some(a), Some(b)) if a == b => continue,
                    (Some(_), Some(_)) => ChangeKind::Modified,
                    (None, Some(_)) => ChangeKind::Added,
                    (Some(_), None) => ChangeKind::Removed,
                    (None, None) => continue,
                };
                let path = join(real, rel);
                let diff = unified_diff(
                    &path,
                    old.map(String::as_str).unwrap_or_default(),
                    new.map(String::as_str).unwrap_or_default(),
                );
                diffs.push(FileDiff { path, change, diff });
            }
        }
        Ok(diffs)
    }
}

fn join(root: &Path, rel: &Path) -> PathBuf {
    if rel.as_os_str().is_empty() {
        root.to_path_buf()
    } else {
        root.join(rel)
    }
}

fn copy_entry(real: &Path, scratch: &Path) -> Result<()> {
    let meta = match fs::symlink_metadata(real) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e).with_context(|| format!("Failed to inspect {}", real.display())),
    };
    if let Some(parent) = scratch.parent() {
        fs::create_dir_all(parent)?;
    }
    if meta.file_type().is_symlink() {
        make_symlink(&fs::read_link(real)?, scratch)
            .with_context(|| format!("Failed to mirror link {}", real.display()))?;
    } else if meta.is_dir() {
        copy_tree(real, scratch)?;
    } else {
        fs::copy(real, scratch).with_context(|| format!("Failed to mirror {}", real.display()))?;
    }
    Ok(())
}
