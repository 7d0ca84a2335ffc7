//! Permissions mapped onto OpenCode's single ask/allow level.

use super::mcp::ensure_schema;
use super::paths::OpenCodePaths;
use crate::adapters::traits::SyncContext;
use crate::adapters::utils::{read_json_object, write_json_object};
use crate::common::{item_id, stale_items, Permissions, Settings};
use crate::report::{SkipReason, SyncResult};
use crate::Result;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::path::Path;

/// `"allow"` only for an explicit bypass with nothing denied or gated; otherwise `"ask"`.
pub fn permission_level(perms: &Permissions) -> &'static str {
    if perms.requests_full_automation() && perms.deny.is_empty() && perms.ask.is_empty() {
        "allow"
    } else {
        "ask"
    }
}

fn permission_block(perms: &Permissions) -> Value {
    let level = permission_level(perms);
    json!({ "edit": level, "bash": level, "webfetch": level })
}

pub fn sync_settings(home: &Path, settings: &Settings, ctx: &SyncContext) -> Result<SyncResult> {
    let mut result = SyncResult::default();
    let level = settings.level();
    let id = item_id("settings", level, "permission");
    let has_perms = !settings.permissions.is_empty();
    let current: BTreeSet<String> = if has_perms {
        BTreeSet::from([id.clone()])
    } else {
        BTreeSet::new()
    };

    for (stale_level, name) in stale_items(&ctx.previous_items, &current, "settings") {
        let Some(paths) = OpenCodePaths::for_level(stale_level, home, ctx.project_dir()) else {
            continue;
        };
        if !paths.config.is_file() {
            continue;
        }
        let mut config = read_json_object(&paths.config)?;
        if config.remove("permission").is_some() {
            write_json_object(&paths.config, config)?;
        }
        result.removed.push(item_id("settings", stale_level, name));
    }

    if !settings.env.is_empty() {
        result.skip(SkipReason::NotRepresentable {
            item: "settings:env".into(),
            reason: "OpenCode has no per-config environment block".into(),
        });
    }
    if !has_perms {
        return Ok(result);
    }
    let Some(paths) = OpenCodePaths::for_level(level, home, ctx.project_dir()) else {
        result.skip(SkipReason::NoProjectDir { item: id });
        return Ok(result);
    };

    let mut config = read_json_object(&paths.config)?;
    let block = permission_block(&settings.permissions);
    if config.get("permission") == Some(&block) {
        result.skip(SkipReason::Unchanged { item: id.clone() });
    } else {
        config.insert("permission".into(), block);
        ensure_schema(&mut config);
        write_json_object(&paths.config, config)?;
        result.synced += 1;
        result.adapted += 1;
    }
    let rules = settings.permissions.allow.len() + settings.permissions.deny.len();
    if rules > 0 {
        result.warn(format!(
            "opencode: {rules} per-tool permission rules collapsed into \"{}\"",
            permission_level(&settings.permissions)
        ));
    }
    result.files.push(paths.config);
    result.track(id);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_requires_bypass_and_no_restrictions() {
        let bypass = Permissions {
            default_mode: Some("bypassPermissions".into()),
            ..Default::default()
        };
        assert_eq!(permission_level(&bypass), "allow");

        let gated = Permissions {
            ask: vec!["Bash".into()],
            ..bypass.clone()
        };
        assert_eq!(permission_level(&gated), "ask");
        assert_eq!(permission_level(&Permissions::default()), "ask");
    }
}
