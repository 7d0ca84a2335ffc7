use super::*;
use crate::common::{McpTransport, TransportKind};
use hsync_test_utils::TestFixture;
use serde_json::json;
use std::fs;

fn reader(fx: &TestFixture) -> SourceReader {
    SourceReader::new(SourceConfig {
        claude_home: fx.claude_home.clone(),
        home: fx.home.clone(),
        project_dir: Some(fx.project.clone()),
    })
}

fn install_plugin(fx: &TestFixture, key: &str) -> std::path::PathBuf {
    let root = fx.tempdir.path().join("cache").join(key.replace('@', "-"));
    fs::create_dir_all(root.join("skills/lint")).unwrap();
    fs::write(root.join("skills/lint/SKILL.md"), "---\ndescription: Lint\n---\nLint it.").unwrap();
    let registry = fx.claude_home.join("plugins/installed_plugins.json");
    let mut doc: serde_json::Value = fs::read_to_string(&registry)
        .ok()
        .and_then(|t| serde_json::from_str(&t).ok())
        .unwrap_or_else(|| json!({"plugins": {}}));
    doc["plugins"][key] = json!([{"scope": "user", "installPath": root, "version": "1.0.0"}]);
    fs::create_dir_all(registry.parent().unwrap()).unwrap();
    fs::write(&registry, doc.to_string()).unwrap();
    root
}

#[test]
fn missing_everything_is_an_empty_snapshot() {
    let fx = TestFixture::new().unwrap();
    let snapshot = reader(&fx).read(SyncScope::All);
    assert!(snapshot.is_empty());
    assert!(snapshot.warnings.is_empty());
}

#[test]
fn rules_are_kept_per_scope_in_order() {
    let fx = TestFixture::new().unwrap();
    fx.write_user_rules("Be terse.").unwrap();
    fx.write_project_rules("Use tabs.").unwrap();
    fs::write(fx.project.join("CLAUDE.local.md"), "My overrides.").unwrap();
    fs::create_dir_all(fx.project.join(".claude")).unwrap();
    fs::write(fx.project.join(".claude/CLAUDE.md"), "   \n").unwrap();

    let snapshot = reader(&fx).read(SyncScope::All);
    let scopes: Vec<Scope> = snapshot.rules.iter().map(|r| r.scope).collect();
    assert_eq!(scopes, vec![Scope::User, Scope::Project, Scope::Local]);

    let project_only = reader(&fx).read(SyncScope::Project);
    assert_eq!(project_only.rules.len(), 1);
    assert_eq!(project_only.rules[0].content, "Use tabs.");
}

#[test]
fn project_skill_overrides_user_skill_of_same_name() {
    let fx = TestFixture::new().unwrap();
    fx.create_skill_with_frontmatter("review", "User review", "u").unwrap();
    fx.create_project_skill("review", "---\ndescription: Project review\n---\np").unwrap();
    fx.create_skill_with_frontmatter("deploy", "Deploy", "d").unwrap();
    fs::create_dir_all(fx.claude_home.join("skills/.hidden")).unwrap();
    fs::write(fx.claude_home.join("skills/.hidden/SKILL.md"), "x").unwrap();
    fs::create_dir_all(fx.claude_home.join("skills/no-manifest")).unwrap();

    let snapshot = reader(&fx).read(SyncScope::All);
    assert_eq!(snapshot.skills.len(), 2);
    let review = &snapshot.skills["review"];
    assert_eq!(review.scope, Scope::Project);
    assert_eq!(review.description.as_deref(), Some("Project review"));
    assert_eq!(review.manifest_hash.len(), 64);
}

#[test]
fn agents_and_commands_parse_frontmatter() {
    let fx = TestFixture::new().unwrap();
    fx.create_agent("reviewer", "Reviews code", "<role>\nYou review.\n</role>").unwrap();
    fx.create_command("deploy", "Deploy the app", "Deploy $ARGUMENTS.").unwrap();
    fs::write(fx.claude_home.join("agents/notes.txt"), "ignored").unwrap();
    fs::write(fx.claude_home.join("agents/broken.md"), "---\ntools: [oops\n---\nbody").unwrap();

    let snapshot = reader(&fx).read(SyncScope::User);
    let agent = &snapshot.agents["reviewer"];
    assert_eq!(agent.tools, vec!["Read", "Grep"]);
    assert_eq!(agent.instructions, "You review.");
    assert_eq!(snapshot.agents.len(), 1);
    assert!(snapshot.warnings.iter().any(|w| w.contains("broken.md")));

    let command = &snapshot.commands["deploy"];
    assert_eq!(command.description, "Deploy the app");
    assert_eq!(command.body.trim(), "Deploy $ARGUMENTS.");
}

#[test]
fn malformed_json_is_skipped_with_warning() {
    let fx = TestFixture::new().unwrap();
    fs::write(fx.home.join(".claude.json"), "{ not json").unwrap();
    fx.write_project_mcp(json!({"db": {"command": "pg-mcp"}})).unwrap();

    let snapshot = reader(&fx).read(SyncScope::All);
    assert_eq!(snapshot.mcp_servers.len(), 1);
    assert!(snapshot.warnings.iter().any(|w| w.contains(".claude.json")));
}

#[test]
fn mcp_precedence_prefers_local_then_project() {
    let fx = TestFixture::new().unwrap();
    let project = fx.project.to_string_lossy().into_owned();
    let doc = json!({
        "mcpServers": {
            "github": {"command": "user-gh"},
            "notes": {"url": "https://notes.dev/mcp"}
        },
        "projects": {
            project: {"mcpServers": {"notes": {"url": "https://local.dev/sse"}}}
        }
    });
    fs::write(fx.home.join(".claude.json"), doc.to_string()).unwrap();
    fx.write_project_mcp(json!({"github": {"command": "project-gh"}})).unwrap();

    let servers = reader(&fx).read(SyncScope::All).mcp_servers;
    assert_eq!(servers["github"].scope, Scope::Project);
    assert!(matches!(
        &servers["github"].transport,
        McpTransport::Stdio { command, .. } if command == "project-gh"
    ));
    assert_eq!(servers["notes"].scope, Scope::Local);
    assert_eq!(servers["notes"].kind(), TransportKind::Sse);

    let user_only = reader(&fx).read(SyncScope::User).mcp_servers;
    assert_eq!(user_only["github"].scope, Scope::User);
    assert_eq!(user_only["notes"].kind(), TransportKind::Http);
}

#[test]
fn plugin_assets_and_servers_are_discovered_with_root_expanded() {
    let fx = TestFixture::new().unwrap();
    let root = install_plugin(&fx, "toolkit@market");
    fs::write(
        root.join(".mcp.json"),
        json!({"search": {"command": "${CLAUDE_PLUGIN_ROOT}/bin/search"}}).to_string(),
    )
    .unwrap();

    let snapshot = reader(&fx).read(SyncScope::User);
    assert_eq!(snapshot.skills["lint"].scope, Scope::Plugin);
    let search = &snapshot.mcp_servers["search"];
    assert_eq!(search.plugin.as_deref(), Some("toolkit"));
    let McpTransport::Stdio { command, .. } = &search.transport else {
        panic!("expected stdio");
    };
    assert_eq!(command, &format!("{}/bin/search", root.display()));
}

#[test]
fn user_entries_beat_plugin_entries_and_disabled_plugins_are_ignored() {
    let fx = TestFixture::new().unwrap();
    let root = install_plugin(&fx, "toolkit@market");
    fs::write(
        root.join("plugin.json"),
        json!({"mcpServers": {"search": {"command": "plugin-search"}}}).to_string(),
    )
    .unwrap();
    fx.write_user_mcp(json!({"search": {"command": "my-search"}})).unwrap();
    fx.create_skill_with_frontmatter("lint", "Mine", "m").unwrap();

    let snapshot = reader(&fx).read(SyncScope::All);
    assert_eq!(snapshot.mcp_servers["search"].scope, Scope::User);
    assert_eq!(snapshot.skills["lint"].scope, Scope::User);

    fx.write_user_settings(json!({"enabledPlugins": {"toolkit@market": false}})).unwrap();
    fs::remove_dir_all(fx.claude_home.join("skills/lint")).unwrap();
    let snapshot = reader(&fx).read(SyncScope::All);
    assert!(!snapshot.skills.contains_key("lint"));
}

#[test]
fn settings_layers_merge_by_scope() {
    let fx = TestFixture::new().unwrap();
    fx.write_user_settings(json!({
        "env": {"EDITOR": "vim", "LOG": "info"},
        "permissions": {"allow": ["Read"], "deny": ["Bash(rm:*)"]}
    }))
    .unwrap();
    fs::create_dir_all(fx.project.join(".claude")).unwrap();
    fs::write(
        fx.project.join(".claude/settings.local.json"),
        json!({"env": {"LOG": "debug"}, "permissions": {"deny": []}}).to_string(),
    )
    .unwrap();

    let settings = reader(&fx).read(SyncScope::All).settings;
    assert_eq!(settings.env["EDITOR"], "vim");
    assert_eq!(settings.env["LOG"], "debug");
    assert!(settings.permissions.deny.is_empty());
    assert_eq!(settings.permissions.allow, vec!["Read"]);
    assert_eq!(settings.scope, Some(Scope::Local));
}

#[test]
fn reading_never_writes_to_the_source_tree() {
    let fx = TestFixture::new().unwrap();
    fx.create_skill_with_frontmatter("review", "Review", "r").unwrap();
    fx.write_user_rules("Be terse.").unwrap();
    let before: Vec<_> = walkdir::WalkDir::new(fx.tempdir.path())
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .collect();

    reader(&fx).read(SyncScope::All);

    let after: Vec<_> = walkdir::WalkDir::new(fx.tempdir.path())
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .collect();
    assert_eq!(before, after);
}
