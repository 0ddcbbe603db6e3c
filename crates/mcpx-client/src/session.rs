use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use rmcp::RoleClient;
use rmcp::model::{CallToolRequestParam, CallToolResult};
use rmcp::service::RunningService;
use tokio::sync::Mutex;

use mcpx_config::ServerConfig;
use mcpx_core::{McpxError, types::ToolInfo};

use crate::retry::{RetryConfig, with_retry};
use crate::transport::{self, TransportHandle};

/// An established MCP client bound to one server.
///
/// Calls are serialized through an internal lock, matching the pool
/// contract that a session serves one in-flight request at a time.
/// `close` is idempotent and must be reached on every exit path; it
/// cancels the client and tears the transport down (with a kill grace
/// for stdio children).
pub struct McpSession {
    name: String,
    instructions: Option<String>,
    inner: Mutex<Option<SessionInner>>,
}

impl std::fmt::Debug for McpSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpSession")
            .field("name", &self.name)
            .field("instructions", &self.instructions)
            .finish_non_exhaustive()
    }
}

struct SessionInner {
    service: RunningService<RoleClient, ()>,
    transport: TransportHandle,
}

impl McpSession {
    pub fn server_name(&self) -> &str {
        &self.name
    }

    /// Server-advertised instructions captured at handshake.
    pub fn instructions(&self) -> Option<&str> {
        self.instructions.as_deref()
    }

    pub async fn list_tools(&self) -> Result<Vec<ToolInfo>> {
        let guard = self.inner.lock().await;
        let inner = guard
            .as_ref()
            .ok_or_else(|| anyhow!("session '{}' is closed", self.name))?;
        let response = inner
            .service
            .list_tools(None)
            .await
            .map_err(|error| anyhow!("tools/list on '{}' failed: {error}", self.name))?;

        Ok(response
            .tools
            .into_iter()
            .map(|tool| ToolInfo {
                name: tool.name.to_string(),
                description: tool.description.map(|d| d.to_string()),
                input_schema: serde_json::Value::Object(tool.input_schema.as_ref().clone()),
            })
            .collect())
    }

    /// Invoke one tool. A tool-level error arrives as a normal
    /// [`CallToolResult`] with `is_error` set; an `Err` here is a
    /// transport or protocol failure.
    pub async fn call_tool(
        &self,
        tool: &str,
        args: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Result<CallToolResult> {
        let guard = self.inner.lock().await;
        let inner = guard
            .as_ref()
            .ok_or_else(|| anyhow!("session '{}' is closed", self.name))?;
        inner
            .service
            .call_tool({
                let params = CallToolRequestParam::new(tool.to_string());
                match args {
                    Some(arguments) => params.with_arguments(arguments),
                    None => params,
                }
            })
            .await
            .map_err(|error| anyhow!("{error}"))
    }

    /// Tear down the client and the transport. Safe to call twice.
    pub async fn close(&self) {
        let inner = self.inner.lock().await.take();
        if let Some(SessionInner { service, transport }) = inner {
            if let Err(error) = service.cancel().await {
                tracing::debug!(server = %self.name, error = %error, "MCP client cancel failed");
            }
            transport.shutdown().await;
        }
    }
}

/// Build a live session from a server config.
///
/// Each attempt builds a fresh transport; the handshake runs under the
/// retry policy against the shared deadline. Terminal stdio failures
/// arrive annotated with the captured stderr head.
pub async fn open_session(
    name: &str,
    config: &ServerConfig,
    retry: &RetryConfig,
    deadline: Instant,
) -> mcpx_core::Result<McpSession> {
    let (service, transport) = with_retry("connect", retry, deadline, || async {
        let attempt_timeout = deadline
            .saturating_duration_since(Instant::now())
            .max(Duration::from_millis(100));
        match tokio::time::timeout(attempt_timeout, transport::connect(name, config)).await {
            Ok(result) => result,
            Err(_) => Err(anyhow!("MCP handshake with '{name}' timed out")),
        }
    })
    .await
    .map_err(|error| McpxError::connect_failed(name, format!("{error:#}")))?;

    let instructions = service
        .peer_info()
        .and_then(|info| info.instructions.clone());

    Ok(McpSession {
        name: name.to_string(),
        instructions,
        inner: Mutex::new(Some(SessionInner { service, transport })),
    })
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
