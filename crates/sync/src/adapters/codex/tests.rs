//! Tests for the Codex adapter.

use super::*;
use crate::adapters::env_vars::EnvMap;
use crate::adapters::test_support::{agent, command, http, servers, skill, skills, sse, stdio};
use crate::common::{Permissions, Scope, SyncScope};
use crate::report::SkipReason;
use std::fs;
use std::path::Path;
use tempfile::{tempdir, TempDir};

struct Env {
    tmp: TempDir,
    adapter: CodexAdapter,
}

impl Env {
    fn new() -> Self {
        let tmp = tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("project")).unwrap();
        let adapter = CodexAdapter::new(tmp.path().join("home"));
        Self { tmp, adapter }
    }

    fn root(&self) -> &Path {
        self.tmp.path()
    }

    fn home(&self) -> std::path::PathBuf {
        self.tmp.path().join("home")
    }

    fn project(&self) -> std::path::PathBuf {
        self.tmp.path().join("project")
    }

    fn ctx(&self, env: &[(&str, &str)]) -> SyncContext {
        let env: EnvMap = env
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        SyncContext::new(SyncScope::All, Some(self.project())).with_env(env)
    }

    fn user_config(&self) -> toml::Table {
        fs::read_to_string(self.home().join(".codex/config.toml"))
            .unwrap()
            .parse()
            .unwrap()
    }
}

fn rule(scope: Scope, path: &Path, content: &str) -> RuleSource {
    RuleSource {
        scope,
        path: path.to_path_buf(),
        content: content.into(),
    }
}

// ==========================================
// Rules
// ==========================================

#[test]
fn rules_route_by_level_and_keep_user_text() {
    let env = Env::new();
    let user_agents = env.home().join(".codex/AGENTS.md");
    fs::create_dir_all(user_agents.parent().unwrap()).unwrap();
    fs::write(&user_agents, "# My own notes\n").unwrap();

    let rules = vec![
        rule(Scope::User, &env.root().join("CLAUDE.md"), "Prefer small diffs."),
        rule(Scope::Project, &env.project().join("CLAUDE.md"), "Run cargo fmt."),
    ];
    let result = env.adapter.sync_rules(&rules, &env.ctx(&[])).unwrap();

    assert_eq!(result.synced, 2);
    let user = fs::read_to_string(&user_agents).unwrap();
    assert!(user.starts_with("# My own notes\n"));
    assert!(user.contains("Prefer small diffs."));
    assert!(!user.contains("Run cargo fmt."));
    let project = fs::read_to_string(env.project().join("AGENTS.md")).unwrap();
    assert!(project.contains("Run cargo fmt."));
}

// ==========================================
// Skills, agents, commands
// ==========================================

#[cfg(unix)]
#[test]
fn skills_are_symlinked_and_stale_ones_removed() {
    let env = Env::new();
    let review = skill(env.root(), Scope::User, "review");
    let lint = skill(env.root(), Scope::User, "lint");
    let ctx = env.ctx(&[]);

    let first = env
        .adapter
        .sync_skills(&skills(vec![review.clone(), lint]), &ctx)
        .unwrap();
    assert_eq!(first.synced, 2);
    let lint_dst = env.home().join(".codex/skills/lint");
    assert!(fs::symlink_metadata(&lint_dst).unwrap().file_type().is_symlink());

    let ctx = ctx.with_previous_items(first.items.clone());
    let second = env.adapter.sync_skills(&skills(vec![review]), &ctx).unwrap();
    assert_eq!(second.removed, vec!["skill:user:lint"]);
    assert!(fs::symlink_metadata(&lint_dst).is_err());
    assert!(env.home().join(".codex/skills/review/SKILL.md").is_file());
}

#[test]
fn agents_and_commands_become_generated_skills() {
    let env = Env::new();
    let agents = BTreeMap::from([(
        "reviewer".to_string(),
        agent(env.root(), Scope::User, "reviewer"),
    )]);
    let commands = BTreeMap::from([(
        "deploy".to_string(),
        command(env.root(), Scope::Project, "deploy"),
    )]);
    let ctx = env.ctx(&[]);

    let result = env.adapter.sync_agents(&agents, &ctx).unwrap();
    assert_eq!((result.synced, result.adapted), (1, 1));
    let manifest =
        fs::read_to_string(env.home().join(".codex/skills/agent-reviewer/SKILL.md")).unwrap();
    assert!(manifest.starts_with("---\n"));
    assert!(manifest.contains("agent-reviewer"));
    assert!(manifest.contains("Review code carefully."));
    assert!(manifest.contains("Read, Grep"));

    let result = env.adapter.sync_commands(&commands, &ctx).unwrap();
    assert_eq!(result.items, vec!["command:project:deploy"]);
    let manifest =
        fs::read_to_string(env.project().join(".codex/skills/cmd-deploy/SKILL.md")).unwrap();
    assert!(manifest.contains("Arguments: <env>"));

    let again = env
        .adapter
        .sync_agents(&agents, &ctx.clone().with_previous_items(["agent:user:reviewer".to_string()]))
        .unwrap();
    assert_eq!(again.synced, 0);
}

#[test]
fn generated_skill_does_not_replace_a_user_skill_of_the_same_name() {
    let env = Env::new();
    let existing = env.home().join(".codex/skills/agent-reviewer");
    fs::create_dir_all(&existing).unwrap();
    fs::write(existing.join("SKILL.md"), "mine").unwrap();
    let agents = BTreeMap::from([(
        "reviewer".to_string(),
        agent(env.root(), Scope::User, "reviewer"),
    )]);

    let result = env.adapter.sync_agents(&agents, &env.ctx(&[])).unwrap();

    assert!(matches!(result.skipped[0], SkipReason::Unmanaged { .. }));
    assert_eq!(fs::read_to_string(existing.join("SKILL.md")).unwrap(), "mine");
}

// ==========================================
// MCP servers
// ==========================================

#[test]
fn env_reference_is_whitelisted_not_written_literally() {
    let env = Env::new();
    let list = servers(vec![stdio(
        "github",
        Scope::User,
        "gh-mcp",
        &[("TOKEN", "${GITHUB_TOKEN}"), ("GITHUB_TOKEN", "${GITHUB_TOKEN}")],
    )]);

    let result = env
        .adapter
        .sync_mcp(&list, &env.ctx(&[("GITHUB_TOKEN", "ghp_example")]))
        .unwrap();

    assert_eq!(result.synced, 1);
    assert_eq!(result.adapted, 1);
    let config = env.user_config();
    let github = &config["mcp_servers"]["github"];
    assert_eq!(github["command"].as_str(), Some("gh-mcp"));
    let whitelist: Vec<&str> = github["env_vars"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|v| v.as_str())
        .collect();
    assert_eq!(whitelist, vec!["GITHUB_TOKEN"]);
    let text = fs::read_to_string(env.home().join(".codex/config.toml")).unwrap();
    assert!(!text.contains("${"));
}

#[test]
fn sse_servers_are_skipped_with_reason() {
    let env = Env::new();
    let list = servers(vec![
        sse("events", Scope::User, "https://example.com/sse"),
        http("docs", Scope::User, "https://example.com/mcp", &[("Authorization", "Bearer ${DOCS_TOKEN}")]),
    ]);

    let result = env.adapter.sync_mcp(&list, &env.ctx(&[])).unwrap();

    assert!(matches!(
        result.skipped[0],
        SkipReason::UnsupportedTransport { ref server, .. } if server == "events"
    ));
    let config = env.user_config();
    assert!(config["mcp_servers"].get("events").is_none());
    assert_eq!(
        config["mcp_servers"]["docs"]["bearer_token_env_var"].as_str(),
        Some("DOCS_TOKEN")
    );
}

#[test]
fn project_servers_go_to_project_config_and_local_to_user() {
    let env = Env::new();
    let list = servers(vec![
        stdio("db", Scope::Project, "db-mcp", &[]),
        stdio("private", Scope::Local, "priv-mcp", &[]),
    ]);

    env.adapter.sync_mcp(&list, &env.ctx(&[])).unwrap();

    let project: toml::Table = fs::read_to_string(env.project().join(".codex/config.toml"))
        .unwrap()
        .parse()
        .unwrap();
    assert!(project["mcp_servers"].get("db").is_some());
    assert!(project["mcp_servers"].get("private").is_none());
    assert!(env.user_config()["mcp_servers"].get("private").is_some());
}

#[test]
fn second_run_is_a_no_op_and_removal_keeps_user_tables() {
    let env = Env::new();
    let config_path = env.home().join(".codex/config.toml");
    fs::create_dir_all(config_path.parent().unwrap()).unwrap();
    fs::write(&config_path, "model = \"o3\"\n\n[mcp_servers.mine]\ncommand = \"mine\"\n").unwrap();
    let list = servers(vec![stdio("a", Scope::User, "a-mcp", &[])]);

    let first = env.adapter.sync_mcp(&list, &env.ctx(&[])).unwrap();
    let written = fs::read_to_string(&config_path).unwrap();
    let ctx = env.ctx(&[]).with_previous_items(first.items);
    let second = env.adapter.sync_mcp(&list, &ctx).unwrap();
    assert_eq!(second.synced, 0);
    assert_eq!(fs::read_to_string(&config_path).unwrap(), written);

    let third = env.adapter.sync_mcp(&BTreeMap::new(), &ctx).unwrap();
    assert_eq!(third.removed, vec!["mcp:user:a"]);
    let config = env.user_config();
    assert_eq!(config["model"].as_str(), Some("o3"));
    assert!(config["mcp_servers"].get("mine").is_some());
    assert!(config["mcp_servers"].get("a").is_none());
}

#[test]
fn user_defined_server_with_same_name_is_left_alone() {
    let env = Env::new();
    let config_path = env.home().join(".codex/config.toml");
    fs::create_dir_all(config_path.parent().unwrap()).unwrap();
    fs::write(&config_path, "[mcp_servers.a]\ncommand = \"custom\"\n").unwrap();

    let result = env
        .adapter
        .sync_mcp(&servers(vec![stdio("a", Scope::User, "a-mcp", &[])]), &env.ctx(&[]))
        .unwrap();

    assert!(matches!(result.skipped[0], SkipReason::Unmanaged { .. }));
    assert_eq!(env.user_config()["mcp_servers"]["a"]["command"].as_str(), Some("custom"));
}

#[test]
fn malformed_config_is_an_error_and_left_untouched() {
    let env = Env::new();
    let config_path = env.home().join(".codex/config.toml");
    fs::create_dir_all(config_path.parent().unwrap()).unwrap();
    fs::write(&config_path, "[mcp_servers\nbroken").unwrap();

    let list = servers(vec![stdio("a", Scope::User, "a-mcp", &[])]);
    assert!(env.adapter.sync_mcp(&list, &env.ctx(&[])).is_err());
    assert_eq!(fs::read_to_string(&config_path).unwrap(), "[mcp_servers\nbroken");
}

// ==========================================
// Settings
// ==========================================

#[test]
fn denials_force_read_only_sandbox_and_env_is_set() {
    let env = Env::new();
    let settings = Settings {
        env: BTreeMap::from([("RUST_LOG".to_string(), "debug".to_string())]),
        permissions: Permissions {
            deny: vec!["Bash(rm:*)".into()],
            default_mode: Some("bypassPermissions".into()),
            ..Default::default()
        },
        scope: Some(Scope::User),
    };

    let result = env.adapter.sync_settings(&settings, &env.ctx(&[])).unwrap();

    assert_eq!(result.synced, 1);
    let config = env.user_config();
    assert_eq!(config["sandbox_mode"].as_str(), Some("read-only"));
    assert_eq!(config["approval_policy"].as_str(), Some("on-request"));
    assert_eq!(
        config["shell_environment_policy"]["set"]["RUST_LOG"].as_str(),
        Some("debug")
    );
}

#[test]
fn managed_paths_cover_both_levels() {
    let env = Env::new();
    let paths = env.adapter.managed_paths(&env.ctx(&[]));
    assert!(paths.contains(&env.home().join(".codex/config.toml")));
    assert!(paths.contains(&env.project().join("AGENTS.md")));
    assert!(paths.contains(&env.project().join(".codex/skills")));
    assert_eq!(env.adapter.name(), "codex");
}
