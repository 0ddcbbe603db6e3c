use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Transport half of a server config.
///
/// Exactly one variant applies; the wire format discriminates by field
/// presence (`command` vs `url`), and a config carrying both is rejected
/// at parse time.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ServerTransport {
    /// Spawn a child process communicating over stdio (JSON-RPC on stdin/stdout).
    Stdio {
        command: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<String>,
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        env: HashMap<String, String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cwd: Option<PathBuf>,
    },
    /// Connect to a remote MCP server via Streamable HTTP.
    Http {
        url: String,
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        headers: HashMap<String, String>,
        /// Request timeout in milliseconds.
        #[serde(
            default,
            rename = "timeout",
            skip_serializing_if = "Option::is_none"
        )]
        timeout_ms: Option<u64>,
    },
}

impl ServerTransport {
    /// Short human-readable label for the transport type.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Stdio { .. } => "stdio",
            Self::Http { .. } => "http",
        }
    }
}

/// One named server entry from an mcpx config document.
///
/// # JSON format
///
/// ```json
/// {
///   "mcpServers": {
///     "fs": { "command": "npx", "args": ["-y", "fs-mcp"] },
///     "wiki": { "url": "https://mcp.deepwiki.com/mcp",
///               "headers": { "Authorization": "Bearer t" } }
///   }
/// }
/// ```
///
/// `includeTools` / `disabledTools` are glob filters attached to either
/// transport; `allowedTools` is accepted as an alias of `includeTools`,
/// and supplying both is an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerConfig {
    #[serde(flatten)]
    pub transport: ServerTransport,
    #[serde(
        default,
        rename = "includeTools",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub include_tools: Vec<String>,
    #[serde(
        default,
        rename = "disabledTools",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub disabled_tools: Vec<String>,
}

impl ServerConfig {
    pub fn is_stdio(&self) -> bool {
        matches!(&self.transport, ServerTransport::Stdio { .. })
    }
}

impl<'de> Deserialize<'de> for ServerConfig {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(deny_unknown_fields)]
        struct Raw {
            // Stdio fields
            command: Option<String>,
            #[serde(default)]
            args: Vec<String>,
            #[serde(default)]
            env: HashMap<String, String>,
            cwd: Option<PathBuf>,
            // Http fields
            url: Option<String>,
            #[serde(default)]
            headers: HashMap<String, String>,
            #[serde(rename = "timeout")]
            timeout_ms: Option<u64>,
            // Tool filters
            #[serde(rename = "includeTools")]
            include_tools: Option<Vec<String>>,
            #[serde(rename = "allowedTools")]
            allowed_tools: Option<Vec<String>>,
            #[serde(default, rename = "disabledTools")]
            disabled_tools: Vec<String>,
        }

        let raw = Raw::deserialize(deserializer)?;

        let transport = match (raw.command, raw.url) {
            (Some(_), Some(_)) => {
                return Err(serde::de::Error::custom(
                    "'command' and 'url' are mutually exclusive; \
                     a server is either stdio or http",
                ));
            }
            (Some(command), None) => ServerTransport::Stdio {
                command,
                args: raw.args,
                env: raw.env,
                cwd: raw.cwd,
            },
            (None, Some(url)) => ServerTransport::Http {
                url,
                headers: raw.headers,
                timeout_ms: raw.timeout_ms,
            },
            (None, None) => {
                return Err(serde::de::Error::custom(
                    "server config requires either 'command' (stdio) or 'url' (http)",
                ));
            }
        };

        let include_tools = match (raw.include_tools, raw.allowed_tools) {
            (Some(_), Some(_)) => {
                return Err(serde::de::Error::custom(
                    "'includeTools' and 'allowedTools' are aliases; supply only one",
                ));
            }
            (include, allowed) => include.or(allowed).unwrap_or_default(),
        };

        Ok(ServerConfig {
            transport,
            include_tools,
            disabled_tools: raw.disabled_tools,
        })
    }
}
