//! CLAUDE.md discovery.

use super::{read_text, ReadLog, SourceConfig};
use crate::common::{RuleSource, Scope, SyncScope};
use std::path::PathBuf;

/// Rules in user, project, local order; empty files are ignored.
pub(super) fn read_rules(config: &SourceConfig, scope: SyncScope, log: &mut ReadLog) -> Vec<RuleSource> {
    let mut candidates: Vec<(Scope, PathBuf)> = vec![(Scope::User, config.user_rules())];
    candidates.extend(config.project_rules().into_iter().map(|p| (Scope::Project, p)));
    candidates.extend(config.local_rules().map(|p| (Scope::Local, p)));

    candidates
        .into_iter()
        .filter(|(s, _)| scope.includes(*s))
        .filter_map(|(s, path)| {
            let content = read_text(&path, log)?;
            (!content.trim().is_empty()).then_some(RuleSource {
                scope: s,
                path,
                content,
            })
        })
        .collect()
}
