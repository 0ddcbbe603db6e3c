use std::path::PathBuf;

/// Broker-wide error type.
///
/// Variants group into four kinds: client (bad input, unknown names),
/// server/tool (reachable server, failing tool), network (connect,
/// handshake, IPC), and config (file and shape problems). The kind
/// determines the process exit code via [`exit_code`].
#[derive(thiserror::Error, Debug)]
pub enum McpxError {
    // Client errors
    #[error("Usage error: {0}")]
    Usage(String),

    #[error("Invalid target '{0}': expected server/tool")]
    InvalidTarget(String),

    #[error("Invalid JSON arguments: {0}")]
    InvalidJsonArgs(#[from] serde_json::Error),

    #[error("Unknown server '{}'. Configured servers: {}", server, available.join(", "))]
    ServerNotFound {
        server: String,
        available: Vec<String>,
    },

    #[error("Tool '{tool}' is disabled by pattern '{pattern}'")]
    ToolDisabled { tool: String, pattern: String },

    #[error("Timed out reading tool arguments from stdin after {0}s")]
    StdinTimeout(u64),

    // Server/tool errors
    #[error("Tool '{tool}' not found on server '{server}'")]
    ToolNotFound { tool: String, server: String },

    #[error("Tool '{tool}' on server '{server}' failed: {message}")]
    ToolFailed {
        tool: String,
        server: String,
        message: String,
    },

    // Network errors
    #[error("Failed to connect to server '{server}': {message}")]
    ConnectFailed { server: String, message: String },

    #[error("Daemon request failed: {0}")]
    Daemon(String),

    #[error("Failed to bind daemon socket at '{}': {}", path.display(), source)]
    SocketBind {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Config errors
    #[error("Failed to read config file '{}': {}", path.display(), source)]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    ConfigInvalid(String),

    #[error("No MCP server configuration found (pass -c <path|json> or create .mcp.json)")]
    NoConfig,
}

/// Result alias using [`McpxError`].
pub type Result<T> = std::result::Result<T, McpxError>;

/// Process exit code for an error: 1 client/config, 2 server/tool, 3 network.
pub fn exit_code(error: &McpxError) -> i32 {
    match error {
        McpxError::Usage(_)
        | McpxError::InvalidTarget(_)
        | McpxError::InvalidJsonArgs(_)
        | McpxError::ServerNotFound { .. }
        | McpxError::ToolDisabled { .. }
        | McpxError::StdinTimeout(_)
        | McpxError::ConfigRead { .. }
        | McpxError::ConfigInvalid(_)
        | McpxError::NoConfig => 1,

        McpxError::ToolNotFound { .. } | McpxError::ToolFailed { .. } => 2,

        McpxError::ConnectFailed { .. } | McpxError::Daemon(_) | McpxError::SocketBind { .. } => 3,
    }
}

impl McpxError {
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }

    pub fn connect_failed(server: &str, message: impl Into<String>) -> Self {
        Self::ConnectFailed {
            server: server.to_string(),
            message: message.into(),
        }
    }

    pub fn tool_failed(server: &str, tool: &str, message: impl Into<String>) -> Self {
        Self::ToolFailed {
            tool: tool.to_string(),
            server: server.to_string(),
            message: message.into(),
        }
    }

    /// Advisory remediation hint selected by substring inspection of the
    /// underlying message. Printed to stderr next to the error; never
    /// affects control flow.
    pub fn suggestion(&self) -> Option<&'static str> {
        let message = self.to_string().to_lowercase();
        if matches!(self, Self::SocketBind { .. }) {
            Some("remove the stale socket file or point MCP_DAEMON_SOCKET at a writable path")
        } else if message.contains("no such file") || message.contains("enoent") {
            Some("check that the server command is installed and on PATH")
        } else if message.contains("401")
            || message.contains("403")
            || message.contains("unauthorized")
            || message.contains("forbidden")
            || message.contains("auth")
        {
            Some("check the server's credentials or auth headers")
        } else if message.contains("429") || message.contains("rate limit") {
            Some("the server is rate limiting; retry after a pause")
        } else if message.contains("timed out") || message.contains("timeout") {
            Some("increase MCP_TIMEOUT or check that the server is responsive")
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_server_not_found() {
        let err = McpxError::ServerNotFound {
            server: "browsr".into(),
            available: vec!["browser".into(), "fs".into()],
        };
        assert_eq!(
            err.to_string(),
            "Unknown server 'browsr'. Configured servers: browser, fs"
        );
    }

    #[test]
    fn test_display_tool_disabled() {
        let err = McpxError::ToolDisabled {
            tool: "browser/navigate".into(),
            pattern: "*/*".into(),
        };
        assert_eq!(
            err.to_string(),
            "Tool 'browser/navigate' is disabled by pattern '*/*'"
        );
    }

    #[test]
    fn test_exit_codes_by_kind() {
        assert_eq!(exit_code(&McpxError::usage("bad")), 1);
        assert_eq!(exit_code(&McpxError::NoConfig), 1);
        assert_eq!(
            exit_code(&McpxError::ToolNotFound {
                tool: "t".into(),
                server: "s".into(),
            }),
            2
        );
        assert_eq!(exit_code(&McpxError::tool_failed("s", "t", "boom")), 2);
        assert_eq!(exit_code(&McpxError::connect_failed("s", "refused")), 3);
        assert_eq!(exit_code(&McpxError::Daemon("gone".into())), 3);
    }

    #[test]
    fn test_suggestion_enoent() {
        let err = McpxError::connect_failed("fs", "spawn failed: No such file or directory");
        assert_eq!(
            err.suggestion(),
            Some("check that the server command is installed and on PATH")
        );
    }

    #[test]
    fn test_suggestion_auth() {
        let err = McpxError::connect_failed("api", "HTTP 401 Unauthorized");
        assert_eq!(
            err.suggestion(),
            Some("check the server's credentials or auth headers")
        );
    }

    #[test]
    fn test_suggestion_timeout() {
        let err = McpxError::connect_failed("slow", "handshake timed out");
        assert_eq!(
            err.suggestion(),
            Some("increase MCP_TIMEOUT or check that the server is responsive")
        );
    }

    #[test]
    fn test_suggestion_none_for_plain_errors() {
        let err = McpxError::InvalidTarget("server".into());
        assert_eq!(err.suggestion(), None);
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<McpxError>();
    }
}
