//! Detection of literal credentials in MCP server definitions.
//!
//! Values are never logged or returned; a finding names only the server and key.

use crate::adapters::env_vars::has_placeholders;
use crate::common::{McpServer, McpTransport};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

const SECRET_KEYWORDS: &[&str] = &[
    "API_KEY",
    "APIKEY",
    "API-KEY",
    "SECRET",
    "PASSWORD",
    "PASSWD",
    "TOKEN",
    "PRIVATE_KEY",
    "CREDENTIAL",
    "AUTH",
];

const SAFE_PREFIXES: &[&str] = &["TEST_", "EXAMPLE_", "DEMO_", "MOCK_", "FAKE_", "DUMMY_"];

static SECRET_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_\-+=/.]{16,}$").expect("valid regex"));

/// A literal value that looks like a credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretFinding {
    pub server: String,
    /// `env` or `headers`
    pub field: String,
    pub key: String,
    pub keywords: Vec<String>,
}

impl fmt::Display for SecretFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MCP server '{}' {} {} holds a literal credential (matched {})",
            self.server,
            self.field,
            self.key,
            self.keywords.join(", ")
        )
    }
}

fn matched_keywords(key: &str) -> Vec<String> {
    let upper = key.to_ascii_uppercase();
    if SAFE_PREFIXES.iter().any(|p| upper.starts_with(p)) {
        return Vec::new();
    }
    SECRET_KEYWORDS
        .iter()
        .filter(|k| upper.contains(*k))
        .map(|k| k.to_string())
        .collect()
}

/// True when `key = value` looks like a hard-coded secret.
pub fn looks_secret(key: &str, value: &str) -> bool {
    !has_placeholders(value) && !matched_keywords(key).is_empty() && SECRET_VALUE.is_match(value)
}

fn scan_map(server: &str, field: &str, map: &BTreeMap<String, String>, out: &mut Vec<SecretFinding>) {
    for (key, value) in map {
        let value = value.strip_prefix("Bearer ").unwrap_or(value);
        if looks_secret(key, value) {
            out.push(SecretFinding {
                server: server.to_string(),
                field: field.to_string(),
                key: key.clone(),
                keywords: matched_keywords(key),
            });
        }
    }
}

/// Scans every server's env and headers for literal credentials.
pub fn scan_servers(servers: &BTreeMap<String, McpServer>) -> Vec<SecretFinding> {
    let mut findings = Vec::new();
    for (name, server) in servers {
        match &server.transport {
            McpTransport::Stdio { env, .. } => scan_map(name, "env", env, &mut findings),
            McpTransport::Http { headers, .. } | McpTransport::Sse { headers, .. } => {
                scan_map(name, "headers", headers, &mut findings)
            }
        }
    }
    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Scope;
    use std::path::PathBuf;

    fn stdio(env: &[(&str, &str)]) -> BTreeMap<String, McpServer> {
        let server = McpServer {
            name: "github".into(),
            transport: McpTransport::Stdio {
                command: "gh-mcp".into(),
                args: vec![],
                env: env.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            },
            scope: Scope::User,
            plugin: None,
            source: PathBuf::from("/h/.claude.json"),
        };
        BTreeMap::from([("github".to_string(), server)])
    }

    #[test]
    fn literal_token_is_found() {
        let findings = scan_servers(&stdio(&[("GITHUB_TOKEN", "ghp_abcdefghijklmnop1234")]));
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].key, "GITHUB_TOKEN");
        assert!(!findings[0].to_string().contains("ghp_"));
    }

    #[test]
    fn placeholders_short_values_and_safe_prefixes_pass() {
        let servers = stdio(&[
            ("GITHUB_TOKEN", "${GITHUB_TOKEN}"),
            ("API_KEY", "short"),
            ("TEST_API_KEY", "abcdefghijklmnopqrstuvwxyz"),
            ("LOG_LEVEL", "abcdefghijklmnopqrstuvwxyz"),
        ]);
        assert!(scan_servers(&servers).is_empty());
    }

    #[test]
    fn bearer_headers_are_checked() {
        assert!(looks_secret("Authorization", "sk-live_abcdefghijklmnop"));
        assert!(!looks_secret("Authorization", "${API_TOKEN}"));
    }
}
