//! Shared test utilities for hsync crates.
//!
//! This crate provides common test fixtures and utilities used across
//! multiple crates in the hsync workspace.

use std::path::{Path, PathBuf};
use std::sync::{LazyLock, Mutex, MutexGuard};

/// Serialize tests that mutate process-global state (env vars, cwd, etc).
///
/// Acquire this guard at the start of any test that modifies environment
/// variables to prevent race conditions between parallel tests.
pub fn env_guard() -> MutexGuard<'static, ()> {
    static TEST_SERIAL: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));
    TEST_SERIAL.lock().unwrap_or_else(|e| e.into_inner())
}

/// RAII guard for environment variables - restores original value on drop.
pub struct EnvVarGuard {
    key: &'static str,
    previous: Option<String>,
}

impl Drop for EnvVarGuard {
    fn drop(&mut self) {
        if let Some(v) = &self.previous {
            std::env::set_var(self.key, v);
        } else {
            std::env::remove_var(self.key);
        }
    }
}

/// Set an environment variable and return a guard that restores the original on drop.
///
/// # Example
/// ```
/// let _guard = hsync_test_utils::set_env_var("MY_VAR", Some("value"));
/// // MY_VAR is set to "value"
/// // When _guard drops, MY_VAR is restored to its original value
/// ```
pub fn set_env_var(key: &'static str, value: Option<&str>) -> EnvVarGuard {
    let previous = std::env::var(key).ok();
    if let Some(val) = value {
        std::env::set_var(key, val);
    } else {
        std::env::remove_var(key);
    }
    EnvVarGuard { key, previous }
}

/// Standard test fixture: a fake home with `~/.claude` plus a project tree.
///
/// Holds the tempdir and provides access to common paths.
/// The tempdir is automatically cleaned up when this struct is dropped.
pub struct TestFixture {
    pub tempdir: tempfile::TempDir,
    /// Path used as `$HOME`
    pub home: PathBuf,
    /// Path to `~/.claude` in the temp environment
    pub claude_home: PathBuf,
    /// A project directory (`<tmp>/project`)
    pub project: PathBuf,
    /// State root used instead of `~/.harnesssync`
    pub state_root: PathBuf,
}

impl TestFixture {
    /// Create a new fixture.
    ///
    /// Creates:
    /// - `<tmp>/home/.claude/`
    /// - `<tmp>/project/`
    /// - `<tmp>/state/`
    ///
    /// Does NOT set HOME env var - use `home_guard()` for that.
    pub fn new() -> std::io::Result<Self> {
        let tempdir = tempfile::tempdir()?;
        let home = tempdir.path().join("home");
        let claude_home = home.join(".claude");
        let project = tempdir.path().join("project");
        let state_root = tempdir.path().join("state");

        std::fs::create_dir_all(&claude_home)?;
        std::fs::create_dir_all(&project)?;
        std::fs::create_dir_all(&state_root)?;

        Ok(Self {
            tempdir,
            home,
            claude_home,
            project,
            state_root,
        })
    }

    /// Get the path that should be set as HOME.
    pub fn home_path(&self) -> &Path {
        &self.home
    }

    /// Create an RAII guard that sets HOME to this fixture's home directory.
    pub fn home_guard(&self) -> EnvVarGuard {
        set_env_var("HOME", Some(&self.home.to_string_lossy()))
    }

    /// Create a user-level skill at `~/.claude/skills/<name>/SKILL.md`.
    ///
    /// Returns the path to the skill directory.
    pub fn create_skill(&self, name: &str, content: &str) -> std::io::Result<PathBuf> {
        write_skill(&self.claude_home.join("skills"), name, content)
    }

    /// Create a user-level skill with standard frontmatter.
    pub fn create_skill_with_frontmatter(
        &self,
        name: &str,
        description: &str,
        body: &str,
    ) -> std::io::Result<PathBuf> {
        let content = format!(
            "---\nname: {}\ndescription: {}\n---\n{}",
            name, description, body
        );
        self.create_skill(name, &content)
    }

    /// Create a project-level skill at `<project>/.claude/skills/<name>/SKILL.md`.
    pub fn create_project_skill(&self, name: &str, content: &str) -> std::io::Result<PathBuf> {
        write_skill(&self.project.join(".claude/skills"), name, content)
    }

    /// Create a user-level agent definition at `~/.claude/agents/<name>.md`.
    pub fn create_agent(
        &self,
        name: &str,
        description: &str,
        body: &str,
    ) -> std::io::Result<PathBuf> {
        let content = format!(
            "---\nname: {}\ndescription: {}\ntools: Read, Grep\n---\n{}",
            name, description, body
        );
        write_file(&self.claude_home.join("agents"), &format!("{name}.md"), &content)
    }

    /// Create a user-level command at `~/.claude/commands/<name>.md`.
    pub fn create_command(
        &self,
        name: &str,
        description: &str,
        body: &str,
    ) -> std::io::Result<PathBuf> {
        let content = format!("---\ndescription: {}\n---\n{}", description, body);
        write_file(&self.claude_home.join("commands"), &format!("{name}.md"), &content)
    }

    /// Write `~/.claude/CLAUDE.md`.
    pub fn write_user_rules(&self, content: &str) -> std::io::Result<PathBuf> {
        write_file(&self.claude_home, "CLAUDE.md", content)
    }

    /// Write `<project>/CLAUDE.md`.
    pub fn write_project_rules(&self, content: &str) -> std::io::Result<PathBuf> {
        write_file(&self.project, "CLAUDE.md", content)
    }

    /// Write user-scope MCP servers into `~/.claude.json`.
    pub fn write_user_mcp(&self, servers: serde_json::Value) -> std::io::Result<PathBuf> {
        let doc = serde_json::json!({ "mcpServers": servers });
        write_file(&self.home, ".claude.json", &doc.to_string())
    }

    /// Write project-scope MCP servers into `<project>/.mcp.json`.
    pub fn write_project_mcp(&self, servers: serde_json::Value) -> std::io::Result<PathBuf> {
        let doc = serde_json::json!({ "mcpServers": servers });
        write_file(&self.project, ".mcp.json", &doc.to_string())
    }

    /// Write `~/.claude/settings.json`.
    pub fn write_user_settings(&self, settings: serde_json::Value) -> std::io::Result<PathBuf> {
        write_file(&self.claude_home, "settings.json", &settings.to_string())
    }
}

fn write_skill(root: &Path, name: &str, content: &str) -> std::io::Result<PathBuf> {
    let skill_dir = root.join(name);
    std::fs::create_dir_all(&skill_dir)?;
    std::fs::write(skill_dir.join("SKILL.md"), content)?;
    Ok(skill_dir)
}

fn write_file(dir: &Path, name: &str, content: &str) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(name);
    std::fs::write(&path, content)?;
    Ok(path)
}
