use super::*;
use crate::adapters::links::is_link_to;
use crate::adapters::traits::MockTargetAdapter;
use crate::adapters::{CodexAdapter, GeminiAdapter};
use crate::common::TransportKind;
use crate::preview::ChangeKind;
use crate::report::SyncResult;
use hsync_test_utils::TestFixture;
use serde_json::json;
use std::fs;
use std::sync::Arc;

fn orchestrator(fx: &TestFixture, registry: AdapterRegistry) -> SyncOrchestrator {
    let reader = SourceReader::new(SourceConfig {
        claude_home: fx.claude_home.clone(),
        home: fx.home.clone(),
        project_dir: Some(fx.project.clone()),
    });
    SyncOrchestrator::new(reader, registry, fx.state_root.clone()).with_env(EnvMap::new())
}

fn defaults(fx: &TestFixture) -> SyncOrchestrator {
    orchestrator(fx, AdapterRegistry::with_defaults(fx.home.clone()))
}

fn seed(fx: &TestFixture) {
    fx.write_user_rules("Be terse.").unwrap();
    fx.create_skill_with_frontmatter("review", "Review code", "Review it.").unwrap();
    fx.write_user_mcp(json!({"github": {"command": "gh-mcp", "env": {"GITHUB_TOKEN": "${GITHUB_TOKEN}"}}}))
        .unwrap();
}

/// A target named `name` that overwrites `marker` and then fails while syncing skills.
fn failing_adapter(name: &str, marker: PathBuf) -> MockTargetAdapter {
    let mut mock = MockTargetAdapter::new();
    mock.expect_name().return_const(name.to_string());
    mock.expect_supported_transports()
        .return_const(&[TransportKind::Stdio][..]);
    let managed = marker.clone();
    mock.expect_managed_paths()
        .returning(move |_| vec![managed.clone()]);
    mock.expect_sync_rules().returning(move |_, _| {
        fs::write(&marker, "half written").unwrap();
        Ok(SyncResult::default())
    });
    mock.expect_sync_skills()
        .returning(|_, _| Err(anyhow::anyhow!("permission denied")));
    mock
}

#[test]
fn first_sync_writes_every_target_and_records_state() {
    let fx = TestFixture::new().unwrap();
    seed(&fx);
    let orch = defaults(&fx);

    let report = orch.sync(&SyncParams::default()).unwrap();

    assert!(report.success, "{}", report.summary);
    assert_eq!(report.targets.len(), 3);
    for target in &report.targets {
        assert_eq!(target.status, TargetStatus::Success, "{}", target.target);
        assert!(target.backup.is_some());
    }
    assert!(fx.home.join(".codex/AGENTS.md").is_file());
    assert!(fx.home.join(".gemini/GEMINI.md").is_file());
    assert!(fx.home.join(".config/opencode/skills/review").exists());

    let state = StateManager::open(&fx.state_root, "default").unwrap();
    let record = state.record("codex", "all").unwrap();
    assert!(record.synced_items.contains(&"skill:user:review".to_string()));
    assert!(!record.target_files.is_empty());
}

#[test]
fn second_run_without_changes_is_a_no_op() {
    let fx = TestFixture::new().unwrap();
    seed(&fx);
    let orch = defaults(&fx);
    orch.sync(&SyncParams::default()).unwrap();
    let gemini = fs::read_to_string(fx.home.join(".gemini/GEMINI.md")).unwrap();

    let report = orch.sync(&SyncParams::default()).unwrap();
    assert!(report.targets.iter().all(|t| t.status == TargetStatus::NoChange));
    assert_eq!(report.total_synced(), 0);

    let forced = orch
        .sync(&SyncParams {
            force: true,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(forced.total_synced(), 0);
    assert_eq!(fs::read_to_string(fx.home.join(".gemini/GEMINI.md")).unwrap(), gemini);
}

#[test]
fn edited_target_file_is_reported_as_drift_and_resynced() {
    let fx = TestFixture::new().unwrap();
    seed(&fx);
    let orch = defaults(&fx);
    orch.sync(&SyncParams::default()).unwrap();

    let gemini_md = fx.home.join(".gemini/GEMINI.md");
    fs::write(&gemini_md, "wiped").unwrap();

    let status = orch.status(SyncScope::All).unwrap();
    let gemini = status.targets.iter().find(|t| t.target == "gemini").unwrap();
    assert!(gemini.has_target_drift());
    assert!(!gemini.source_changed);

    let report = orch.sync(&SyncParams::default()).unwrap();
    let target = report.target("gemini").unwrap();
    assert_eq!(target.status, TargetStatus::Success);
    assert!(target.drift.iter().any(|d| d.contains("GEMINI.md")));
    assert!(fs::read_to_string(&gemini_md).unwrap().contains("Be terse."));
    assert_eq!(report.target("codex").unwrap().status, TargetStatus::NoChange);
}

#[test]
fn one_failing_target_is_rolled_back_and_others_succeed() {
    let fx = TestFixture::new().unwrap();
    seed(&fx);
    let marker = fx.tempdir.path().join("broken-target.txt");
    fs::write(&marker, "original").unwrap();

    let mut registry = AdapterRegistry::new();
    let home = fx.home.clone();
    registry.register("codex", move || Arc::new(CodexAdapter::new(home.clone())));
    let home = fx.home.clone();
    registry.register("gemini", move || Arc::new(GeminiAdapter::new(home.clone())));
    registry.register_instance(Arc::new(failing_adapter("broken", marker.clone())));
    let orch = orchestrator(&fx, registry);

    let report = orch.sync(&SyncParams::default()).unwrap();

    assert!(!report.success);
    let broken = report.target("broken").unwrap();
    assert_eq!(broken.status, TargetStatus::Failed);
    assert!(broken.error.as_deref().unwrap().contains("permission denied"));
    assert_eq!(fs::read_to_string(&marker).unwrap(), "original");
    assert_eq!(report.target("codex").unwrap().status, TargetStatus::Success);
    assert_eq!(report.target("gemini").unwrap().status, TargetStatus::Success);
    assert!(fx.home.join(".codex/config.toml").is_file());

    let state = StateManager::open(&fx.state_root, "default").unwrap();
    let record = state.record("broken", "all").unwrap();
    assert_eq!(record.status, SyncStatus::Failed);
    assert!(record.content_hash.is_none());
}

#[test]
fn parallel_dispatch_matches_sequential_results() {
    let fx = TestFixture::new().unwrap();
    seed(&fx);
    let report = defaults(&fx)
        .sync(&SyncParams {
            parallel: true,
            ..Default::default()
        })
        .unwrap();
    let names: Vec<&str> = report.targets.iter().map(|t| t.target.as_str()).collect();
    assert_eq!(names, vec!["codex", "gemini", "opencode"]);
    assert!(report.success);
}

#[test]
fn dry_run_previews_without_writing() {
    let fx = TestFixture::new().unwrap();
    seed(&fx);
    fx.write_project_mcp(json!({"events": {"url": "https://events.dev/sse"}}))
        .unwrap();

    let report = defaults(&fx)
        .sync(&SyncParams {
            dry_run: true,
            ..Default::default()
        })
        .unwrap();

    assert!(report.targets.iter().all(|t| t.status == TargetStatus::DryRun));
    let codex = report.target("codex").unwrap();
    assert_eq!(codex.mcp.synced, 1);
    assert_eq!(codex.mcp.skipped.len(), 1);
    assert_eq!(report.target("gemini").unwrap().mcp.synced, 2);
    let agents = codex
        .preview
        .iter()
        .find(|d| d.path == fx.home.join(".codex/AGENTS.md"))
        .expect("AGENTS.md in preview");
    assert_eq!(agents.change, ChangeKind::Added);
    assert!(agents.diff.contains("+Be terse."), "{}", agents.diff);
    assert!(report.summary.contains("Be terse."));
    assert!(codex
        .rules
        .files
        .iter()
        .all(|f| f.starts_with(&fx.home) || f.starts_with(&fx.project)));
    assert!(!fx.home.join(".codex").exists());
    assert!(!fx.state_root.join("state.json").exists());
    assert!(!fx.state_root.join("backups").exists());
}

#[test]
fn literal_secrets_block_the_run_unless_allowed() {
    let fx = TestFixture::new().unwrap();
    fx.write_user_mcp(json!({"github": {"command": "gh-mcp", "env": {"GITHUB_TOKEN": "ghp_abcdefghijklmnopqrstu"}}}))
        .unwrap();
    let orch = defaults(&fx);

    let blocked = orch.sync(&SyncParams::default()).unwrap();
    assert!(!blocked.success);
    assert!(blocked.targets.iter().all(|t| t.status == TargetStatus::Blocked));
    assert_eq!(blocked.secrets.len(), 1);
    assert!(!blocked.summary.contains("ghp_"));
    assert!(!fx.home.join(".codex").exists());

    let allowed = orch
        .sync(&SyncParams {
            allow_secrets: true,
            ..Default::default()
        })
        .unwrap();
    assert!(allowed.success);
}

#[test]
fn held_lock_reports_busy_for_that_target_only() {
    let fx = TestFixture::new().unwrap();
    seed(&fx);
    let locks = SyncLocks::new(&fx.state_root);
    let orch = defaults(&fx).with_locks(locks.clone());
    let _held = locks.try_acquire("gemini", "all").unwrap();

    let report = orch.sync(&SyncParams::default()).unwrap();
    assert_eq!(report.target("gemini").unwrap().status, TargetStatus::Busy);
    assert_eq!(report.target("codex").unwrap().status, TargetStatus::Success);
    assert!(report.success);
}

#[test]
fn unknown_target_is_rejected_before_reading() {
    let fx = TestFixture::new().unwrap();
    let err = defaults(&fx)
        .sync(&SyncParams {
            targets: Some(vec!["cursor".into()]),
            ..Default::default()
        })
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SyncError>(),
        Some(SyncError::TargetNotFound { .. })
    ));
}

#[test]
fn prune_keeps_the_newest_backups() {
    let fx = TestFixture::new().unwrap();
    seed(&fx);
    let orch = defaults(&fx);
    for _ in 0..3 {
        orch.sync(&SyncParams {
            force: true,
            targets: Some(vec!["codex".into()]),
            ..Default::default()
        })
        .unwrap();
    }
    let pruned = orch.prune_backups(&["codex".to_string()], 1).unwrap();
    assert_eq!(pruned["codex"], 2);
    assert_eq!(orch.backups().list("codex").unwrap().len(), 1);
}

#[test]
fn dry_run_after_a_source_edit_shows_the_rules_diff_only() {
    let fx = TestFixture::new().unwrap();
    seed(&fx);
    let orch = defaults(&fx);
    let codex_only = || Some(vec!["codex".to_string()]);
    orch.sync(&SyncParams {
        targets: codex_only(),
        ..Default::default()
    })
    .unwrap();
    let agents = fx.home.join(".codex/AGENTS.md");
    let written = fs::read_to_string(&agents).unwrap();
    fx.write_user_rules("Be brief.").unwrap();

    let report = orch
        .sync(&SyncParams {
            targets: codex_only(),
            dry_run: true,
            ..Default::default()
        })
        .unwrap();

    let codex = report.target("codex").unwrap();
    let diff = codex.preview.iter().find(|d| d.path == agents).unwrap();
    assert_eq!(diff.change, ChangeKind::Modified);
    assert!(diff.diff.contains("-Be terse."), "{}", diff.diff);
    assert!(diff.diff.contains("+Be brief."), "{}", diff.diff);
    assert!(!codex
        .preview
        .iter()
        .any(|d| d.path == fx.home.join(".codex/config.toml")));
    assert_eq!(fs::read_to_string(&agents).unwrap(), written);
}

#[test]
fn changed_env_value_rewrites_codex_config() {
    let fx = TestFixture::new().unwrap();
    fx.write_user_mcp(json!({"github": {"command": "gh-mcp", "env": {"TOKEN": "${GITHUB_TOKEN}"}}}))
        .unwrap();
    let env = |token: &str| EnvMap::from([("GITHUB_TOKEN".to_string(), token.to_string())]);
    let params = SyncParams {
        targets: Some(vec!["codex".into()]),
        ..Default::default()
    };
    defaults(&fx).with_env(env("old-token")).sync(&params).unwrap();
    let config = fx.home.join(".codex/config.toml");
    assert!(fs::read_to_string(&config).unwrap().contains("old-token"));

    let orch = defaults(&fx).with_env(env("new-token"));
    let status = orch.status(SyncScope::All).unwrap();
    assert!(status.targets.iter().find(|t| t.target == "codex").unwrap().source_changed);
    let report = orch.sync(&params).unwrap();

    assert_eq!(report.target("codex").unwrap().status, TargetStatus::Success);
    let text = fs::read_to_string(&config).unwrap();
    assert!(text.contains("new-token"), "{text}");
    assert!(!text.contains("old-token"));
}

#[test]
fn env_without_references_keeps_the_plain_snapshot_hash() {
    let fx = TestFixture::new().unwrap();
    seed(&fx);
    let snapshot = defaults(&fx).reader.read(SyncScope::All);
    let unrelated = EnvMap::from([("PATH".to_string(), "/bin".to_string())]);

    assert_eq!(run_hash(&snapshot, &unrelated), run_hash(&snapshot, &EnvMap::new()));
    let token = EnvMap::from([("GITHUB_TOKEN".to_string(), "t".to_string())]);
    assert_ne!(run_hash(&snapshot, &token), run_hash(&snapshot, &EnvMap::new()));
}

#[test]
fn repointed_skill_link_is_drift_and_gets_repaired() {
    let fx = TestFixture::new().unwrap();
    seed(&fx);
    let orch = defaults(&fx);
    orch.sync(&SyncParams::default()).unwrap();

    let link = fx.home.join(".config/opencode/skills/review");
    let source = fx.claude_home.join("skills/review");
    assert!(is_link_to(&link, &source));
    let elsewhere = fx.tempdir.path().join("elsewhere");
    fs::create_dir_all(&elsewhere).unwrap();
    fs::remove_file(&link).unwrap();
    std::os::unix::fs::symlink(&elsewhere, &link).unwrap();

    let status = orch.status(SyncScope::All).unwrap();
    let opencode = status.targets.iter().find(|t| t.target == "opencode").unwrap();
    assert!(opencode.has_target_drift());

    let report = orch.sync(&SyncParams::default()).unwrap();
    let target = report.target("opencode").unwrap();
    assert_eq!(target.status, TargetStatus::Success);
    assert!(target.drift.iter().any(|d| d.contains("skills/review")), "{:?}", target.drift);
    assert!(is_link_to(&link, &source));
    assert_eq!(report.target("codex").unwrap().status, TargetStatus::NoChange);
}

#[test]
fn unreadable_state_file_is_a_warning_not_a_failure() {
    let fx = TestFixture::new().unwrap();
    seed(&fx);
    let state_file = fx.state_root.join("state.json");
    fs::write(&state_file, [0xff, 0xfe, 0x00, 0x7b]).unwrap();
    let orch = defaults(&fx);

    let status = orch.status(SyncScope::All).unwrap();
    assert!(status.warnings.iter().any(|w| w.contains("unreadable")));
    assert!(state_file.exists());

    let report = orch
        .sync(&SyncParams {
            targets: Some(vec!["codex".into()]),
            ..Default::default()
        })
        .unwrap();

    assert!(report.success, "{}", report.summary);
    assert_eq!(report.target("codex").unwrap().status, TargetStatus::Success);
    assert!(report.warnings.iter().any(|w| w.contains("unreadable")), "{:?}", report.warnings);
    assert!(fx.state_root.join("state.json.corrupt").exists());
    let state = StateManager::open(&fx.state_root, "default").unwrap();
    assert!(state.record("codex", "all").is_some());
}

#[test]
fn overlapping_managed_paths_share_a_group() {
    let p = |s: &str| PathBuf::from(s);
    let paths = vec![
        vec![p("/h/.codex"), p("/w/AGENTS.md")],
        vec![p("/h/.gemini"), p("/w/GEMINI.md")],
        vec![p("/h/.config/opencode"), p("/w/AGENTS.md")],
        vec![p("/h/.codex/skills/x")],
    ];

    let mut groups = path_groups(&paths);
    groups.sort();

    assert_eq!(groups, vec![vec![0, 2, 3], vec![1]]);
}

#[test]
fn parallel_writers_of_one_agents_md_do_not_undo_each_other() {
    let fx = TestFixture::new().unwrap();
    seed(&fx);
    fx.write_project_rules("Project rule.").unwrap();
    let agents = fx.project.join("AGENTS.md");

    let mut registry = AdapterRegistry::new();
    let home = fx.home.clone();
    registry.register("codex", move || Arc::new(CodexAdapter::new(home.clone())));
    registry.register_instance(Arc::new(failing_adapter("mirror", agents.clone())));
    let orch = orchestrator(&fx, registry);

    let report = orch
        .sync(&SyncParams {
            parallel: true,
            ..Default::default()
        })
        .unwrap();

    let names: Vec<&str> = report.targets.iter().map(|t| t.target.as_str()).collect();
    assert_eq!(names, vec!["codex", "mirror"]);
    assert_eq!(report.target("codex").unwrap().status, TargetStatus::Success);
    assert_eq!(report.target("mirror").unwrap().status, TargetStatus::Failed);
    let text = fs::read_to_string(&agents).unwrap();
    assert!(text.contains("Project rule."), "{text}");
    assert!(!text.contains("half written"));
}
