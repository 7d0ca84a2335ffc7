//! Managed sections inside user-owned markdown files.
//!
//! Everything between `<!-- hsync:<tag> -->` and `<!-- /hsync:<tag> -->` belongs to
//! hsync; text outside the markers is preserved verbatim.

use super::traits::SyncContext;
use super::utils::{read_optional, write_if_changed};
use crate::common::{item_id, stale_items, RuleSource, TargetLevel};
use crate::report::{SkipReason, SyncResult};
use crate::Result;
use anyhow::Context;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// Tag of the rules block shared by every markdown target file.
pub const RULES_TAG: &str = "rules";

pub fn begin_marker(tag: &str) -> String {
    format!("<!-- hsync:{tag} -->")
}

pub fn end_marker(tag: &str) -> String {
    format!("<!-- /hsync:{tag} -->")
}

pub fn render_block(tag: &str, body: &str) -> String {
    format!("{}\n{}\n{}", begin_marker(tag), body.trim_end(), end_marker(tag))
}

fn locate(existing: &str, tag: &str) -> Option<(usize, usize)> {
    let begin = begin_marker(tag);
    let end = end_marker(tag);
    let start = existing.find(&begin)?;
    let end_rel = existing[start..].find(&end)?;
    Some((start, start + end_rel + end.len()))
}

/// Body of the block `tag`, if present.
pub fn extract_block<'a>(existing: &'a str, tag: &str) -> Option<&'a str> {
    let (start, stop) = locate(existing, tag)?;
    let inner = &existing[start + begin_marker(tag).len()..stop - end_marker(tag).len()];
    Some(inner.trim_matches('\n'))
}

/// Replaces (or appends) the block `tag`. `None` removes it.
pub fn replace_block(existing: &str, tag: &str, body: Option<&str>) -> String {
    match (locate(existing, tag), body) {
        (Some((start, stop)), Some(body)) => {
            format!("{}{}{}", &existing[..start], render_block(tag, body), &existing[stop..])
        }
        (Some((start, stop)), None) => {
            let before = existing[..start].trim_end_matches('\n');
            let after = existing[stop..].trim_start_matches('\n');
            match (before.is_empty(), after.is_empty()) {
                (true, true) => String::new(),
                (true, false) => after.to_string(),
                (false, true) => format!("{before}\n"),
                (false, false) => format!("{before}\n\n{after}"),
            }
        }
        (None, Some(body)) => {
            let trimmed = existing.trim_end();
            if trimmed.is_empty() {
                format!("{}\n", render_block(tag, body))
            } else {
                format!("{trimmed}\n\n{}\n", render_block(tag, body))
            }
        }
        (None, None) => existing.to_string(),
    }
}

/// Renders rules sources into one markdown body, in the given order.
pub fn render_rules(rules: &[&RuleSource]) -> String {
    let sections: Vec<String> = rules
        .iter()
        .map(|rule| {
            let file = rule
                .path
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_default();
            format!("<!-- from {} {file} -->\n{}", rule.scope, rule.content.trim())
        })
        .collect();
    format!(
        "# Rules synced from Claude Code\n\n{}",
        sections.join("\n\n---\n\n")
    )
}

/// Identifier name of a rules source: its file name, prefixed with `.claude/`
/// when it lives in a `.claude` directory.
pub fn rule_name(rule: &RuleSource) -> String {
    let file = rule
        .path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default();
    let in_claude_dir = rule
        .path
        .parent()
        .and_then(Path::file_name)
        .is_some_and(|d| d == ".claude");
    if in_claude_dir {
        format!(".claude/{file}")
    } else {
        file
    }
}

/// Rules that land at `level`, in source order.
pub fn rules_for(rules: &[RuleSource], level: TargetLevel) -> Vec<&RuleSource> {
    rules.iter().filter(|r| r.scope.level() == level).collect()
}

/// Writes the rules block of one level into `path`, removing it when no rules remain.
///
/// A file that held nothing but the block is deleted along with it.
pub fn sync_rules_file(
    path: &Path,
    level: TargetLevel,
    rules: &[&RuleSource],
    ctx: &SyncContext,
    result: &mut SyncResult,
) -> Result<()> {
    let ids: Vec<String> = rules
        .iter()
        .map(|r| item_id("rules", level, &rule_name(r)))
        .collect();
    let current: BTreeSet<String> = ids.iter().cloned().collect();
    let stale: Vec<String> = stale_items(&ctx.previous_items, &current, "rules")
        .into_iter()
        .filter(|(l, _)| *l == level)
        .map(|(l, name)| item_id("rules", l, name))
        .collect();

    let existing = read_optional(path)?;
    let had_block = extract_block(&existing, RULES_TAG).is_some();
    let body = (!rules.is_empty()).then(|| render_rules(rules));
    if body.is_none() && !had_block {
        return Ok(());
    }

    let updated = replace_block(&existing, RULES_TAG, body.as_deref());
    let written = if body.is_none() && updated.trim().is_empty() {
        fs::remove_file(path).with_context(|| format!("Failed to remove {}", path.display()))?;
        true
    } else {
        write_if_changed(path, &updated)?
    };

    if body.is_some() {
        result.files.push(path.to_path_buf());
    }
    for id in ids {
        if written {
            result.synced += 1;
        } else {
            result.skip(SkipReason::Unchanged { item: id.clone() });
        }
        result.track(id);
    }
    if body.is_none() || written {
        result.removed.extend(stale);
    }
    Ok(())
}
