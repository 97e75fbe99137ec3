//! Generated agent configuration for restricted runs.
//!
//! `--no-plugins` and `--allow-all` need the agent launched with a
//! synthesized config: the plugin list filtered down to auth plugins, or
//! a permission map that auto-approves every tool. The config is written
//! into the state directory and handed to the agent via its config
//! environment variable.

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde_json::{json, Map, Value};

use crate::error::Result;
use crate::state::store::StateStore;

/// Environment variable the agent reads its config path from.
pub const AGENT_CONFIG_ENV: &str = "OPENCODE_CONFIG";

const CONFIG_SCHEMA: &str = "https://opencode.ai/config.json";

/// Tools granted in the `--allow-all` permission map.
const ALLOWED_TOOLS: &[&str] = &[
    "read",
    "edit",
    "glob",
    "grep",
    "list",
    "bash",
    "task",
    "webfetch",
    "websearch",
    "codesearch",
    "todowrite",
    "todoread",
    "question",
    "lsp",
    "external_directory",
];

/// What the synthesized config should restrict.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigOptions {
    /// Drop every plugin that is not an auth plugin
    pub filter_plugins: bool,
    /// Auto-approve all tool permissions
    pub allow_all_permissions: bool,
}

impl ConfigOptions {
    /// Whether a config file is needed at all.
    #[must_use]
    pub fn is_needed(&self) -> bool {
        self.filter_plugins || self.allow_all_permissions
    }
}

/// Write the restricted config file and return its path.
pub fn ensure_loop_config(store: &StateStore, options: &ConfigOptions) -> Result<PathBuf> {
    fs::create_dir_all(store.dir())?;

    let mut config = Map::new();
    config.insert("$schema".to_string(), json!(CONFIG_SCHEMA));

    if options.filter_plugins {
        let mut plugins = Vec::new();
        plugins.extend(load_plugins_from_config(&user_config_path()));
        plugins.extend(load_plugins_from_config(
            &store.dir().join("..").join(".opencode").join("opencode.json"),
        ));

        let auth = Regex::new("(?i)auth").expect("valid auth regex");
        let mut seen = std::collections::HashSet::new();
        let filtered: Vec<Value> = plugins
            .into_iter()
            .filter(|p| seen.insert(p.clone()))
            .filter(|p| auth.is_match(p))
            .map(Value::String)
            .collect();
        config.insert("plugin".to_string(), Value::Array(filtered));
    }

    if options.allow_all_permissions {
        let mut permissions = Map::new();
        for tool in ALLOWED_TOOLS {
            permissions.insert((*tool).to_string(), json!("allow"));
        }
        config.insert("permission".to_string(), Value::Object(permissions));
    }

    let path = store.agent_config_path();
    let data = serde_json::to_string_pretty(&Value::Object(config))?;
    fs::write(&path, data)?;
    Ok(path)
}

/// Read the plugin list out of an agent config file.
///
/// The agent's config format permits JSON with comments; both comment
/// styles are stripped before parsing. Unreadable or malformed files
/// yield an empty list.
#[must_use]
pub fn load_plugins_from_config(config_path: &Path) -> Vec<String> {
    let Ok(raw) = fs::read_to_string(config_path) else {
        return Vec::new();
    };

    let without_block = Regex::new(r"/\*[\s\S]*?\*/")
        .expect("valid block comment regex")
        .replace_all(&raw, "");
    let without_line = Regex::new(r"(?m)^\s*//.*$")
        .expect("valid line comment regex")
        .replace_all(&without_block, "");

    let Ok(parsed) = serde_json::from_str::<Value>(&without_line) else {
        return Vec::new();
    };

    parsed
        .get("plugin")
        .and_then(Value::as_array)
        .map(|plugins| {
            plugins
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

fn user_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("opencode")
        .join("opencode.json")
}
