//! Snapshot builders shared by the adapter unit tests.

use crate::common::{AgentDef, CommandDef, McpServer, McpTransport, Scope, SkillRef};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub(crate) fn skill(root: &Path, scope: Scope, name: &str) -> SkillRef {
    let dir = root.join("source-skills").join(name);
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join("SKILL.md"),
        format!("---\nname: {name}\ndescription: {name} skill\n---\n\nDo {name} things.\n"),
    )
    .unwrap();
    SkillRef {
        name: name.into(),
        path: dir,
        scope,
        description: Some(format!("{name} skill")),
        manifest_hash: String::new(),
    }
}

pub(crate) fn skills(list: Vec<SkillRef>) -> BTreeMap<String, SkillRef> {
    list.into_iter().map(|s| (s.name.clone(), s)).collect()
}

pub(crate) fn agent(root: &Path, scope: Scope, name: &str) -> AgentDef {
    let path = root.join("source-agents").join(format!("{name}.md"));
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, format!("---\nname: {name}\n---\nReview code.\n")).unwrap();
    AgentDef {
        name: name.into(),
        path,
        scope,
        description: format!("{name} agent"),
        tools: vec!["Read".into(), "Grep".into()],
        instructions: "Review code carefully.".into(),
    }
}

pub(crate) fn command(root: &Path, scope: Scope, name: &str) -> CommandDef {
    let path = root.join("source-commands").join(format!("{name}.md"));
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, "Deploy $ARGUMENTS.\n").unwrap();
    CommandDef {
        name: name.into(),
        path,
        scope,
        description: format!("{name} command"),
        argument_hint: Some("<env>".into()),
        body: "Deploy $ARGUMENTS.".into(),
    }
}

pub(crate) fn stdio(name: &str, scope: Scope, command: &str, env: &[(&str, &str)]) -> McpServer {
    McpServer {
        name: name.into(),
        transport: McpTransport::Stdio {
            command: command.into(),
            args: vec!["--stdio".into()],
            env: env
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        },
        scope,
        plugin: None,
        source: PathBuf::from("/src/.claude.json"),
    }
}

pub(crate) fn http(name: &str, scope: Scope, url: &str, headers: &[(&str, &str)]) -> McpServer {
    McpServer {
        name: name.into(),
        transport: McpTransport::Http {
            url: url.into(),
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        },
        scope,
        plugin: None,
        source: PathBuf::from("/src/.mcp.json"),
    }
}

pub(crate) fn sse(name: &str, scope: Scope, url: &str) -> McpServer {
    McpServer {
        name: name.into(),
        transport: McpTransport::Sse {
            url: url.into(),
            headers: BTreeMap::new(),
        },
        scope,
        plugin: None,
        source: PathBuf::from("/src/.mcp.json"),
    }
}

pub(crate) fn servers(list: Vec<McpServer>) -> BTreeMap<String, McpServer> {
    list.into_iter().map(|s| (s.name.clone(), s)).collect()
}
