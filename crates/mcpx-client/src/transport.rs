use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use rmcp::RoleClient;
use rmcp::service::{RunningService, ServiceExt};
use rmcp::transport::StreamableHttpClientTransport;
use rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use mcpx_config::{ServerConfig, ServerTransport};

const STDERR_BUFFER_CAP: usize = 8 * 1024;
const CHILD_SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// Captured head of a subprocess's standard error.
///
/// Stdio MCP servers legitimately emit auth banners and interactive
/// prompts on stderr, so every line is forwarded to this process's
/// stderr as it arrives, prefixed with the server name. Until the
/// handshake resolves, lines are also buffered here so a connect error
/// can be annotated with what the server actually said.
pub(crate) struct StderrCapture {
    buffer: Mutex<String>,
    connected: AtomicBool,
}

impl StderrCapture {
    fn new() -> Self {
        Self {
            buffer: Mutex::new(String::new()),
            connected: AtomicBool::new(false),
        }
    }

    /// Stop buffering; forwarding continues for the session's lifetime.
    pub(crate) fn mark_connected(&self) {
        self.connected.store(true, Ordering::Release);
    }

    pub(crate) fn snapshot(&self) -> String {
        self.buffer
            .lock()
            .map(|buffer| buffer.trim_end().to_string())
            .unwrap_or_default()
    }

    fn push(&self, line: &str) {
        if self.connected.load(Ordering::Acquire) {
            return;
        }
        if let Ok(mut buffer) = self.buffer.lock() {
            let remaining = STDERR_BUFFER_CAP.saturating_sub(buffer.len());
            if remaining > 0 {
                let take = line.len().min(remaining);
                buffer.push_str(&line[..take]);
                buffer.push('\n');
            }
        }
    }
}

/// Transport-specific teardown handle held by a session.
pub(crate) enum TransportHandle {
    Stdio {
        child: Box<tokio::process::Child>,
        _stderr: Arc<StderrCapture>,
    },
    Http,
}

impl TransportHandle {
    /// Graceful teardown after the rmcp service has been cancelled:
    /// give the child a grace period to exit, then kill it.
    pub(crate) async fn shutdown(self) {
        match self {
            Self::Stdio { mut child, .. } => {
                match tokio::time::timeout(CHILD_SHUTDOWN_GRACE, child.wait()).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(error)) => {
                        tracing::debug!(error = %error, "failed to wait MCP child process");
                    }
                    Err(_) => {
                        let _ = child.kill().await;
                    }
                }
            }
            Self::Http => {}
        }
    }
}

/// Spawn a stdio MCP server and negotiate the handshake.
///
/// Environment is the process environment with config entries layered on
/// top (config wins); the stderr forwarder is attached before the
/// handshake so interactive prompts are visible from the first byte.
pub(crate) async fn connect_stdio(
    name: &str,
    command: &str,
    args: &[String],
    env: &HashMap<String, String>,
    cwd: Option<&PathBuf>,
) -> Result<(RunningService<RoleClient, ()>, TransportHandle)> {
    let mut cmd = Command::new(command);
    cmd.args(args);
    for (key, value) in env {
        cmd.env(key, value);
    }
    if let Some(cwd) = cwd {
        cmd.current_dir(cwd);
    }
    cmd.stdin(std::process::Stdio::piped());
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());
    cmd.kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("failed to spawn MCP server '{name}' ({command})"))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("failed to capture stdout for MCP server '{name}'"))?;
    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| anyhow!("failed to capture stdin for MCP server '{name}'"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("failed to capture stderr for MCP server '{name}'"))?;

    let (capture, forwarder) = spawn_stderr_forwarder(name.to_string(), stderr);

    let service = match ().serve((stdout, stdin)).await {
        Ok(service) => service,
        Err(error) => {
            let _ = child.kill().await;
            // The kill closes the child's stderr; wait for the forwarder
            // to drain it so the annotation sees the final lines.
            let _ = tokio::time::timeout(Duration::from_millis(500), forwarder).await;
            return Err(annotate_with_stderr(
                anyhow!(error).context(format!("MCP handshake with '{name}' failed")),
                &capture,
            ));
        }
    };

    capture.mark_connected();
    Ok((
        service,
        TransportHandle::Stdio {
            child: Box::new(child),
            _stderr: capture,
        },
    ))
}

/// Connect to a remote MCP server via Streamable HTTP.
///
/// User headers become default headers on the underlying client; the
/// configured timeout (milliseconds) bounds each HTTP request.
pub(crate) async fn connect_http(
    name: &str,
    url: &str,
    headers: &HashMap<String, String>,
    timeout_ms: Option<u64>,
) -> Result<(RunningService<RoleClient, ()>, TransportHandle)> {
    let mut header_map = reqwest::header::HeaderMap::new();
    for (key, value) in headers {
        let header_name = reqwest::header::HeaderName::from_bytes(key.as_bytes())
            .with_context(|| format!("server '{name}': invalid header name '{key}'"))?;
        let header_value = reqwest::header::HeaderValue::from_str(value)
            .with_context(|| format!("server '{name}': invalid value for header '{key}'"))?;
        header_map.insert(header_name, header_value);
    }

    let mut builder = reqwest::Client::builder().default_headers(header_map);
    if let Some(ms) = timeout_ms {
        builder = builder.timeout(Duration::from_millis(ms));
    }
    let client = builder
        .build()
        .with_context(|| format!("server '{name}': failed to build HTTP client"))?;

    let transport = StreamableHttpClientTransport::with_client(
        client,
        StreamableHttpClientTransportConfig::with_uri(url.to_string()),
    );

    let service = ()
        .serve(transport)
        .await
        .with_context(|| format!("failed to connect to MCP server '{name}' at {url}"))?;

    Ok((service, TransportHandle::Http))
}

/// Dispatch on the config variant.
pub(crate) async fn connect(
    name: &str,
    config: &ServerConfig,
) -> Result<(RunningService<RoleClient, ()>, TransportHandle)> {
    match &config.transport {
        ServerTransport::Stdio {
            command,
            args,
            env,
            cwd,
        } => connect_stdio(name, command, args, env, cwd.as_ref()).await,
        ServerTransport::Http {
            url,
            headers,
            timeout_ms,
        } => connect_http(name, url, headers, *timeout_ms).await,
    }
}

fn spawn_stderr_forwarder(
    server_name: String,
    stderr: tokio::process::ChildStderr,
) -> (Arc<StderrCapture>, tokio::task::JoinHandle<()>) {
    let capture = Arc::new(StderrCapture::new());
    let task_capture = capture.clone();
    let handle = tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            eprintln!("[{server_name}] {line}");
            task_capture.push(&line);
        }
    });
    (capture, handle)
}

pub(crate) fn annotate_with_stderr(error: anyhow::Error, capture: &StderrCapture) -> anyhow::Error {
    let stderr = capture.snapshot();
    if stderr.is_empty() {
        error
    } else {
        error.context(format!("server stderr:\n{stderr}"))
    }
}
