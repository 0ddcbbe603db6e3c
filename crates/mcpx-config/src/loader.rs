use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use mcpx_core::{McpxError, Result};
use serde_json::Value;

use crate::ServerConfig;

/// Where a config document came from, propagated to the daemon so
/// `daemon status` can display provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Path(PathBuf),
    Inline,
    None,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::Inline => write!(f, "<inline>"),
            Self::None => write!(f, "<none>"),
        }
    }
}

/// A parsed config document: named servers plus provenance.
#[derive(Debug, Clone)]
pub struct ConfigDocument {
    pub servers: BTreeMap<String, ServerConfig>,
    pub source: ConfigSource,
}

impl ConfigDocument {
    /// Look up one server, with an unknown-name error listing what exists.
    pub fn server(&self, name: &str) -> Result<&ServerConfig> {
        self.servers
            .get(name)
            .ok_or_else(|| McpxError::ServerNotFound {
                server: name.to_string(),
                available: self.servers.keys().cloned().collect(),
            })
    }

    /// Error when a command needs servers and none are configured.
    pub fn require_servers(&self) -> Result<()> {
        if self.servers.is_empty() {
            return Err(McpxError::NoConfig);
        }
        Ok(())
    }
}

/// Load a config document from `-c <path|inline-json>`, or discover one.
///
/// An argument starting with `{` is parsed as inline JSON; anything else
/// is treated as a file path. Without an argument the default locations
/// are tried in order (`./.mcp.json`, `./mcp.json`,
/// `~/.mcp-cli/config.json`); absence yields an empty document with
/// `<none>` provenance rather than an error.
pub fn load_config(arg: Option<&str>) -> Result<ConfigDocument> {
    match arg {
        Some(raw) if raw.trim_start().starts_with('{') => {
            let servers = parse_document(raw, "<inline>")?;
            Ok(ConfigDocument {
                servers,
                source: ConfigSource::Inline,
            })
        }
        Some(path) => load_file(Path::new(path)),
        None => {
            for candidate in default_config_paths() {
                if candidate.exists() {
                    return load_file(&candidate);
                }
            }
            Ok(ConfigDocument {
                servers: BTreeMap::new(),
                source: ConfigSource::None,
            })
        }
    }
}

fn load_file(path: &Path) -> Result<ConfigDocument> {
    let raw = std::fs::read_to_string(path).map_err(|source| McpxError::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;
    let servers = parse_document(&raw, &path.display().to_string())?;
    Ok(ConfigDocument {
        servers,
        source: ConfigSource::Path(path.to_path_buf()),
    })
}

/// Parse a config document body.
///
/// The canonical shape wraps servers under `mcpServers`; a bare
/// name→config object is accepted for inline use.
fn parse_document(raw: &str, origin: &str) -> Result<BTreeMap<String, ServerConfig>> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| McpxError::ConfigInvalid(format!("{origin}: invalid JSON: {e}")))?;

    let map = match &value {
        Value::Object(object) => match object.get("mcpServers") {
            Some(Value::Object(servers)) => servers,
            Some(other) => {
                return Err(McpxError::ConfigInvalid(format!(
                    "{origin}: 'mcpServers' must be an object, got {}",
                    json_type(other)
                )));
            }
            None => object,
        },
        other => {
            return Err(McpxError::ConfigInvalid(format!(
                "{origin}: expected a JSON object, got {}",
                json_type(other)
            )));
        }
    };

    let mut servers = BTreeMap::new();
    for (name, entry) in map {
        let config: ServerConfig = serde_json::from_value(entry.clone()).map_err(|e| {
            McpxError::ConfigInvalid(format!("{origin}: server '{name}': {e}"))
        })?;
        servers.insert(name.clone(), config);
    }
    Ok(servers)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a bool",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(".mcp.json"), PathBuf::from("mcp.json")];
    if let Some(base) = directories::BaseDirs::new() {
        paths.push(base.home_dir().join(".mcp-cli").join("config.json"));
    }
    paths
}
