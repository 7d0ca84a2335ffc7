//! `${VAR}` / `${VAR:-default}` interpolation as written in Claude MCP configs,
//! and its rewrites into each target's form.

use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").expect("valid regex")
});

/// Process environment captured for one run.
pub type EnvMap = BTreeMap<String, String>;

pub fn has_placeholders(value: &str) -> bool {
    PLACEHOLDER.is_match(value)
}

/// Names of every variable referenced in `value`.
pub fn referenced_vars(value: &str) -> Vec<String> {
    PLACEHOLDER
        .captures_iter(value)
        .map(|c| c[1].to_string())
        .collect()
}

/// When `value` is exactly one placeholder, returns its variable and default.
pub fn exact_placeholder(value: &str) -> Option<(&str, Option<&str>)> {
    let caps = PLACEHOLDER.captures(value)?;
    let whole = caps.get(0)?;
    if whole.start() != 0 || whole.end() != value.len() {
        return None;
    }
    let var = caps.get(1)?.as_str();
    Some((var, caps.get(2).map(|m| m.as_str())))
}

/// Result of expanding a value against an environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expansion {
    pub value: String,
    /// Variables that were unset and had no default.
    pub unresolved: Vec<String>,
}

/// Expands placeholders the way the source tool does: `${VAR}` takes the
/// variable's value, `${VAR:-d}` falls back to `d` when VAR is unset or empty.
pub fn expand(value: &str, env: &EnvMap) -> Expansion {
    let mut unresolved = Vec::new();
    let expanded = PLACEHOLDER.replace_all(value, |caps: &Captures| {
        let var = &caps[1];
        match (env.get(var), caps.get(2)) {
            (Some(v), Some(default)) if v.is_empty() => default.as_str().to_string(),
            (Some(v), _) => v.clone(),
            (None, Some(default)) => default.as_str().to_string(),
            (None, None) => {
                unresolved.push(var.to_string());
                String::new()
            }
        }
    });
    Expansion {
        value: expanded.into_owned(),
        unresolved,
    }
}

/// Effective value of a source env entry; `None` when it cannot resolve.
pub fn source_effective(value: &str, env: &EnvMap) -> Option<String> {
    let expansion = expand(value, env);
    expansion.unresolved.is_empty().then_some(expansion.value)
}

/// Environment for a Codex MCP server: literal values plus a pass-through whitelist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodexEnv {
    pub env: BTreeMap<String, String>,
    /// Variables forwarded from the parent environment at runtime (`env_vars`).
    pub env_vars: Vec<String>,
    pub warnings: Vec<String>,
}

/// Rewrites a source env map for Codex, which has no runtime interpolation.
///
/// `KEY = "${KEY}"` becomes a whitelist entry. Any other placeholder is
/// resolved now from `env`; referenced variables are also whitelisted unless
/// they are keys of their own. Entries that cannot resolve are dropped.
pub fn translate_for_codex(server: &str, source: &BTreeMap<String, String>, env: &EnvMap) -> CodexEnv {
    let mut out = CodexEnv::default();
    for (key, value) in source {
        if let Some((var, None)) = exact_placeholder(value) {
            if var == key {
                push_unique(&mut out.env_vars, var);
                continue;
            }
        }
        if !has_placeholders(value) {
            out.env.insert(key.clone(), value.clone());
            continue;
        }
        let expansion = expand(value, env);
        if !expansion.unresolved.is_empty() {
            out.warnings.push(format!(
                "MCP server '{server}': env {key} dropped, {} not set",
                expansion.unresolved.join(", ")
            ));
            continue;
        }
        for var in referenced_vars(value) {
            if !source.contains_key(&var) && env.contains_key(&var) {
                push_unique(&mut out.env_vars, &var);
            }
        }
        out.warnings.push(format!(
            "MCP server '{server}': env {key} written as a resolved value"
        ));
        out.env.insert(key.clone(), expansion.value);
    }
    out.env_vars.sort();
    out
}

/// What Codex hands the server for `key`: the literal entry, else the forwarded variable.
pub fn codex_effective(key: &str, codex: &CodexEnv, env: &EnvMap) -> Option<String> {
    if let Some(v) = codex.env.get(key) {
        return Some(v.clone());
    }
    if codex.env_vars.iter().any(|v| v == key) {
        return env.get(key).cloned();
    }
    None
}

/// Resolves only `${VAR:-default}` forms, leaving plain `${VAR}` untouched.
///
/// Returns the new value and whether anything was resolved.
pub fn resolve_defaults(value: &str, env: &EnvMap) -> (String, bool) {
    let mut changed = false;
    let out = PLACEHOLDER.replace_all(value, |caps: &Captures| match caps.get(2) {
        Some(default) => {
            changed = true;
            match env.get(&caps[1]) {
                Some(v) if !v.is_empty() => v.clone(),
                _ => default.as_str().to_string(),
            }
        }
        None => caps[0].to_string(),
    });
    (out.into_owned(), changed)
}

/// Rewrites `${VAR}` into OpenCode's `{env:VAR}`; default forms are resolved now.
pub fn to_opencode(value: &str, env: &EnvMap) -> (String, bool) {
    let (resolved, changed) = resolve_defaults(value, env);
    let out = PLACEHOLDER.replace_all(&resolved, |caps: &Captures| format!("{{env:{}}}", &caps[1]));
    (out.into_owned(), changed)
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}
