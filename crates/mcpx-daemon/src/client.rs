use std::path::PathBuf;
use std::time::Duration;

use http_body_util::BodyExt;
use hyper_util::rt::TokioIo;
use tokio::net::UnixStream;

use mcpx_core::{McpxError, Result};

use crate::DAEMON_SENTINEL_ENV;
use crate::protocol::{DaemonRequest, DaemonResponse};

const SPAWN_POLL_ATTEMPTS: u32 = 20;
const SPAWN_POLL_INTERVAL: Duration = Duration::from_millis(100);
const STOP_POLL_ATTEMPTS: u32 = 10;
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// CLI-side handle to the daemon socket.
///
/// Each request is a single POST over a fresh UNIX stream; the daemon
/// holds the long-lived state, not this client.
pub struct DaemonClient {
    socket_path: PathBuf,
}

impl DaemonClient {
    pub fn new(socket_path: PathBuf) -> Self {
        Self { socket_path }
    }

    pub fn socket_path(&self) -> &std::path::Path {
        &self.socket_path
    }

    /// Whether the socket file exists at all. Presence does not imply a
    /// live daemon; see [`is_running`](Self::is_running).
    pub fn socket_exists(&self) -> bool {
        self.socket_path.exists()
    }

    /// Readiness probe: the socket file exists and a `list` round-trip
    /// succeeds. A stale file without a listener reports not-running.
    pub async fn is_running(&self) -> bool {
        if !self.socket_exists() {
            return false;
        }
        self.request(&DaemonRequest::List).await.is_ok()
    }

    /// Send one request and parse the response envelope.
    ///
    /// Non-2xx statuses are still parsed (the daemon reports malformed
    /// requests and handler failures through the same JSON shape).
    pub async fn request(&self, request: &DaemonRequest) -> Result<DaemonResponse> {
        self.request_inner(request)
            .await
            .map_err(|error| McpxError::Daemon(format!("{error:#}")))
    }

    async fn request_inner(&self, request: &DaemonRequest) -> anyhow::Result<DaemonResponse> {
        use anyhow::Context;

        let stream = UnixStream::connect(&self.socket_path)
            .await
            .with_context(|| {
                format!(
                    "failed to connect daemon socket {}",
                    self.socket_path.display()
                )
            })?;

        let (mut sender, connection) =
            hyper::client::conn::http1::handshake(TokioIo::new(stream))
                .await
                .context("daemon HTTP handshake failed")?;
        tokio::spawn(async move {
            let _ = connection.await;
        });

        let body = serde_json::to_vec(request).context("failed to encode daemon request")?;
        let http_request = hyper::Request::builder()
            .method(hyper::Method::POST)
            .uri("/")
            .header(hyper::header::HOST, "mcpx-daemon")
            .header(hyper::header::CONTENT_TYPE, "application/json")
            .body(http_body_util::Full::new(bytes::Bytes::from(body)))
            .context("failed to build daemon request")?;

        let response = sender
            .send_request(http_request)
            .await
            .context("daemon request failed")?;
        let bytes = response
            .into_body()
            .collect()
            .await
            .context("failed to read daemon response")?
            .to_bytes();

        serde_json::from_slice(&bytes).context("failed to parse daemon response")
    }

    /// Connect-or-spawn: reuse a live daemon, otherwise detach a child
    /// of the current executable and poll until it answers.
    pub async fn ensure_running(&self) -> Result<()> {
        if self.is_running().await {
            return Ok(());
        }

        self.spawn_daemon_process()?;

        for attempt in 0..SPAWN_POLL_ATTEMPTS {
            tokio::time::sleep(SPAWN_POLL_INTERVAL).await;
            if self.is_running().await {
                tracing::debug!(attempt, "daemon became ready");
                return Ok(());
            }
        }

        Err(McpxError::Daemon(format!(
            "daemon did not become ready at {} within {:?}",
            self.socket_path.display(),
            SPAWN_POLL_INTERVAL * SPAWN_POLL_ATTEMPTS,
        )))
    }

    fn spawn_daemon_process(&self) -> Result<()> {
        let exe = std::env::current_exe().map_err(|error| {
            McpxError::Daemon(format!("failed to resolve current executable: {error}"))
        })?;

        let child = std::process::Command::new(exe)
            .arg("daemon")
            .arg("run")
            .env(DAEMON_SENTINEL_ENV, "1")
            .env("MCP_DAEMON_SOCKET", &self.socket_path)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .map_err(|error| McpxError::Daemon(format!("failed to spawn daemon: {error}")))?;

        tracing::debug!(pid = child.id(), "spawned daemon process");
        Ok(())
    }

    /// Stop the daemon, returning the names it released.
    ///
    /// With more than one pooled server and `force` unset this refuses,
    /// so one agent cannot tear down sessions another agent is using.
    pub async fn stop(&self, force: bool) -> Result<Vec<String>> {
        if !self.is_running().await {
            return Err(McpxError::Daemon(format!(
                "daemon is not running at {}",
                self.socket_path.display()
            )));
        }

        if !force {
            let listing = self.request(&DaemonRequest::List).await?;
            let servers = listing.servers.unwrap_or_default();
            if servers.len() > 1 {
                return Err(McpxError::usage(format!(
                    "daemon is serving {} servers ({}); pass --force to stop anyway",
                    servers.len(),
                    servers.join(", ")
                )));
            }
        }

        let response = self.request(&DaemonRequest::Shutdown).await?;
        if let Some(error) = response.error {
            return Err(McpxError::Daemon(error));
        }

        for _ in 0..STOP_POLL_ATTEMPTS {
            tokio::time::sleep(STOP_POLL_INTERVAL).await;
            if !self.is_running().await {
                break;
            }
        }

        Ok(response.servers.unwrap_or_default())
    }
}
