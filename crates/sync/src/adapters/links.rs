//! Symlink placement with copy fallback, and removal of stale managed entries.

use super::traits::SyncContext;
use super::utils::hash_content;
use crate::common::TargetLevel;
use crate::report::{SkipReason, SyncResult};
use crate::Result;
use anyhow::Context;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

const MARKER_PREFIX: &str = ".hsync-source-";

/// How an entry ended up on the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    Linked,
    /// Symlinking failed; a copy plus marker file was written.
    Copied,
    Unchanged,
}

/// Marker file recording the source of a copied entry: `<parent>/.hsync-source-<name>.txt`.
pub fn marker_path(dst: &Path) -> PathBuf {
    let name = dst
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dst.with_file_name(format!("{MARKER_PREFIX}{name}.txt"))
}

fn exists_no_follow(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}

/// True when `dst` is a symlink resolving to `src`.
pub fn is_link_to(dst: &Path, src: &Path) -> bool {
    match fs::read_link(dst) {
        Ok(target) => target == src,
        Err(_) => false,
    }
}

/// True when `dst` carries hsync's copy marker.
pub fn has_copy_marker(dst: &Path) -> bool {
    marker_path(dst).is_file()
}

/// Stable hash of a file or directory tree (relative paths plus contents).
pub fn tree_hash(path: &Path) -> Result<String> {
    let mut buf = Vec::new();
    for entry in WalkDir::new(path).follow_links(true).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {}", path.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(path).unwrap_or(entry.path());
        buf.extend_from_slice(rel.to_string_lossy().as_bytes());
        buf.push(0);
        buf.extend_from_slice(&fs::read(entry.path())?);
        buf.push(0);
    }
    Ok(hash_content(&buf))
}

/// Fingerprint of a managed target entry for drift detection; `None` when absent.
///
/// A symlink is identified by where it points (plus the content it reaches
/// when that is a file), a copied directory by its tree hash, and a plain
/// file by its content hash.
pub fn entry_fingerprint(path: &Path) -> Result<Option<String>> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("Failed to stat {}", path.display())),
    };
    if meta.file_type().is_symlink() {
        let target = fs::read_link(path)
            .with_context(|| format!("Failed to read link {}", path.display()))?;
        let fingerprint = if path.is_file() {
            format!("link:{}:{}", target.display(), hash_content(&fs::read(path)?))
        } else {
            format!("link:{}", target.display())
        };
        return Ok(Some(fingerprint));
    }
    if meta.is_dir() {
        return Ok(Some(format!("tree:{}", tree_hash(path)?)));
    }
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(Some(hash_content(&bytes)))
}

pub(crate) fn remove_entry(path: &Path) -> Result<()> {
    let meta = fs::symlink_metadata(path)?;
    let removed = if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    removed.with_context(|| format!("Failed to remove {}", path.display()))
}

#[cfg(unix)]
pub(crate) fn make_symlink(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(src, dst)
}

#[cfg(windows)]
pub(crate) fn make_symlink(src: &Path, dst: &Path) -> std::io::Result<()> {
    if src.is_dir() {
        std::os::windows::fs::symlink_dir(src, dst)
    } else {
        std::os::windows::fs::symlink_file(src, dst)
    }
}

/// Copies `src` to `dst` and writes the marker file.
pub(crate) fn copy_with_marker(src: &Path, dst: &Path) -> Result<()> {
    if src.is_dir() {
        for entry in WalkDir::new(src).follow_links(true) {
            let entry = entry.with_context(|| format!("Failed to walk {}", src.display()))?;
            let rel = entry.path().strip_prefix(src).unwrap_or(entry.path());
            let out = dst.join(rel);
            if entry.file_type().is_dir() {
                fs::create_dir_all(&out)?;
            } else {
                fs::copy(entry.path(), &out)
                    .with_context(|| format!("Failed to copy {}", entry.path().display()))?;
            }
        }
    } else {
        fs::copy(src, dst).with_context(|| format!("Failed to copy {}", src.display()))?;
    }
    write_marker(dst, src)
}

/// Records `src` as the origin of the hsync-owned entry `dst`.
pub(crate) fn write_marker(dst: &Path, src: &Path) -> Result<()> {
    let marker = marker_path(dst);
    let content = src.to_string_lossy();
    if fs::read_to_string(&marker).is_ok_and(|existing| existing == content) {
        return Ok(());
    }
    hsync_state::write_atomic(&marker, content.as_bytes())
}

/// True when an entry exists at `dst` that hsync neither created nor marked.
pub fn is_foreign(dst: &Path, id: &str, ctx: &SyncContext) -> bool {
    exists_no_follow(dst) && !ctx.was_managed(id) && !has_copy_marker(dst)
}

/// Points `dst` at `src`, replacing whatever hsync placed there before.
pub fn link_or_copy(src: &Path, dst: &Path) -> Result<LinkOutcome> {
    if is_link_to(dst, src) {
        return Ok(LinkOutcome::Unchanged);
    }
    if has_copy_marker(dst) && dst.exists() && tree_hash(dst)? == tree_hash(src)? {
        return Ok(LinkOutcome::Unchanged);
    }
    if exists_no_follow(dst) {
        remove_entry(dst)?;
    }
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    match make_symlink(src, dst) {
        Ok(()) => {
            let marker = marker_path(dst);
            if marker.exists() {
                fs::remove_file(&marker)?;
            }
            Ok(LinkOutcome::Linked)
        }
        Err(err) => {
            warn!(src = %src.display(), dst = %dst.display(), error = %err, "Symlink failed, copying instead");
            copy_with_marker(src, dst)?;
            Ok(LinkOutcome::Copied)
        }
    }
}

/// Places one linked item, honouring ownership: entries hsync did not create
/// are left alone, and externally changed managed entries are reported as drift.
pub fn place_link(
    src: &Path,
    dst: &Path,
    id: &str,
    ctx: &SyncContext,
    result: &mut SyncResult,
) -> Result<()> {
    if exists_no_follow(dst) && !is_link_to(dst, src) {
        if is_foreign(dst, id, ctx) {
            warn!(item = %id, path = %dst.display(), "Leaving unmanaged target entry in place");
            result.skip(SkipReason::Unmanaged {
                item: id.to_string(),
                path: dst.to_path_buf(),
            });
            return Ok(());
        }
        if is_symlink(dst) {
            let points_to = fs::read_link(dst).unwrap_or_default();
            result.warn(format!(
                "drift: {} pointed to {}; relinked to {}",
                dst.display(),
                points_to.display(),
                src.display()
            ));
        } else if !has_copy_marker(dst) {
            result.warn(format!(
                "drift: {} was replaced outside hsync; relinked to {}",
                dst.display(),
                src.display()
            ));
        }
    }

    match link_or_copy(src, dst)? {
        LinkOutcome::Unchanged => result.skip(SkipReason::Unchanged {
            item: id.to_string(),
        }),
        LinkOutcome::Linked => result.synced += 1,
        LinkOutcome::Copied => {
            result.synced += 1;
            result.warn(format!("{id}: symlink unavailable, copied {}", src.display()));
        }
    }
    result.files.push(dst.to_path_buf());
    result.track(id);
    Ok(())
}

/// Removes a managed entry (symlink, or copy with marker). Returns whether anything was removed.
pub fn remove_managed(dst: &Path) -> Result<bool> {
    if is_symlink(dst) {
        fs::remove_file(dst).with_context(|| format!("Failed to remove {}", dst.display()))?;
        return Ok(true);
    }
    let marker = marker_path(dst);
    if marker.is_file() {
        if exists_no_follow(dst) {
            remove_entry(dst)?;
        }
        fs::remove_file(&marker)?;
        return Ok(true);
    }
    Ok(false)
}

/// Removes stale entries of `kind` not tracked in `result.items`.
///
/// `locate` maps `(level, name)` to the entry path, `remove` deletes it if it is ours.
pub fn cleanup_stale(
    kind: &str,
    ctx: &SyncContext,
    result: &mut SyncResult,
    locate: impl Fn(TargetLevel, &str) -> Option<PathBuf>,
    remove: impl Fn(&Path) -> Result<bool>,
) -> Result<()> {
    let current_ids: BTreeSet<String> = result.items.iter().cloned().collect();
    for (level, name) in crate::common::stale_items(&ctx.previous_items, &current_ids, kind) {
        let Some(path) = locate(level, name) else {
            continue;
        };
        if remove(&path)? {
            debug!(kind, name, path = %path.display(), "Removed stale entry");
            result
                .removed
                .push(crate::common::item_id(kind, level, name));
        }
    }
    Ok(())
}
