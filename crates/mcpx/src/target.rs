use mcpx_core::{McpxError, Result};

/// A `server/tool` invocation target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub server: String,
    pub tool: String,
}

impl Target {
    /// Split at the first `/`; tool names may themselves contain slashes.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.split_once('/') {
            Some((server, tool)) if !server.is_empty() && !tool.is_empty() => Ok(Self {
                server: server.to_string(),
                tool: tool.to_string(),
            }),
            _ => Err(McpxError::InvalidTarget(raw.to_string())),
        }
    }

    pub fn qualified(&self) -> String {
        format!("{}/{}", self.server, self.tool)
    }
}
