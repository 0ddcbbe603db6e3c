use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::Value;
use tokio::net::UnixListener;
use tokio_util::sync::CancellationToken;

use mcpx_client::RetryConfig;
use mcpx_config::Settings;
use mcpx_core::{McpxError, Result};

use crate::client::DaemonClient;
use crate::pool::ConnectionPool;
use crate::protocol::{CallParams, DaemonRequest, DaemonResponse};
use crate::socket;

/// How long the `shutdown` reply gets to flush before the process exits.
const SHUTDOWN_REPLY_GRACE: Duration = Duration::from_millis(100);

pub(crate) struct DaemonState {
    pub(crate) pool: Arc<ConnectionPool>,
    pub(crate) shutdown: CancellationToken,
}

/// Run the daemon until a signal or a `shutdown` request stops it.
///
/// Refuses to displace a live daemon on the same socket; a stale socket
/// file (present but unresponsive) is removed and rebound.
pub async fn run_daemon(settings: &Settings) -> Result<()> {
    let probe = DaemonClient::new(settings.socket_path.clone());
    if probe.is_running().await {
        return Err(McpxError::Daemon(format!(
            "a daemon is already running at {}",
            settings.socket_path.display()
        )));
    }

    let listener = socket::bind_listener(&settings.socket_path).await?;
    tracing::info!(socket = %settings.socket_path.display(), "daemon listening");

    let pool = ConnectionPool::new(
        RetryConfig::from_settings(settings),
        Duration::from_millis(settings.idle_timeout_ms),
    );
    let state = Arc::new(DaemonState {
        pool: pool.clone(),
        shutdown: CancellationToken::new(),
    });

    let served = serve_on(listener, state).await;

    // Signal-path cleanup; after a `shutdown` request the pool is
    // already drained and this is a no-op.
    let released = pool.release_all().await;
    if !released.is_empty() {
        tracing::debug!(servers = ?released, "released sessions on shutdown");
    }
    socket::cleanup_socket_file(&settings.socket_path).await;

    served.map_err(|error| McpxError::Daemon(format!("daemon server failed: {error:#}")))
}

/// Accept requests on an already-bound listener until shutdown.
pub(crate) async fn serve_on(
    listener: UnixListener,
    state: Arc<DaemonState>,
) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/", post(handle_request))
        .with_state(state.clone());

    let shutdown = state.shutdown.clone();
    let mut sigterm =
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(signal) => Some(signal),
            Err(error) => {
                tracing::warn!(error = %error, "failed to register SIGTERM handler");
                None
            }
        };

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            match sigterm.as_mut() {
                Some(sigterm) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = sigterm.recv() => {}
                        _ = shutdown.cancelled() => {}
                    }
                }
                None => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = shutdown.cancelled() => {}
                    }
                }
            }
        })
        .await?;
    Ok(())
}

async fn handle_request(
    State(state): State<Arc<DaemonState>>,
    payload: std::result::Result<Json<Value>, JsonRejection>,
) -> (StatusCode, Json<DaemonResponse>) {
    let Ok(Json(value)) = payload else {
        return (
            StatusCode::BAD_REQUEST,
            Json(DaemonResponse::error("invalid JSON")),
        );
    };

    let request = match serde_json::from_value::<DaemonRequest>(value) {
        Ok(request) => request,
        Err(error) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(DaemonResponse::error(error.to_string())),
            );
        }
    };

    match dispatch(&state, request).await {
        Ok(response) => (StatusCode::OK, Json(response)),
        Err(error) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(DaemonResponse::error(format!("{error:#}"))),
        ),
    }
}

/// Method dispatch. Domain failures (connect errors, tool errors) are
/// reported through the response `error` field so the CLI can classify
/// them; an `Err` here means the handler itself failed and maps to 500.
async fn dispatch(state: &DaemonState, request: DaemonRequest) -> anyhow::Result<DaemonResponse> {
    match request {
        DaemonRequest::Connect(params) => {
            match state
                .pool
                .acquire(&params.server, &params.config, &params.config_source)
                .await
            {
                Ok(acquired) => Ok(DaemonResponse {
                    ok: Some(true),
                    already_connected: Some(acquired.already_connected),
                    ..DaemonResponse::default()
                }),
                Err(error) => Ok(DaemonResponse::error(error.to_string())),
            }
        }
        DaemonRequest::Call(params) => handle_call(state, params).await,
        DaemonRequest::Disconnect(params) => {
            let present = state.pool.release(&params.server).await;
            Ok(DaemonResponse {
                ok: Some(present),
                ..DaemonResponse::default()
            })
        }
        DaemonRequest::Has(params) => Ok(DaemonResponse {
            has: Some(state.pool.has(&params.server).await),
            ..DaemonResponse::default()
        }),
        DaemonRequest::List => Ok(DaemonResponse {
            servers: Some(state.pool.list().await),
            ..DaemonResponse::default()
        }),
        DaemonRequest::ListDetailed => Ok(DaemonResponse {
            servers_detailed: Some(state.pool.list_detailed().await),
            ..DaemonResponse::default()
        }),
        DaemonRequest::Shutdown => {
            let servers = state.pool.release_all().await;
            let shutdown = state.shutdown.clone();
            tokio::spawn(async move {
                tokio::time::sleep(SHUTDOWN_REPLY_GRACE).await;
                shutdown.cancel();
            });
            Ok(DaemonResponse {
                ok: Some(true),
                servers: Some(servers),
                ..DaemonResponse::default()
            })
        }
    }
}

async fn handle_call(state: &DaemonState, params: CallParams) -> anyhow::Result<DaemonResponse> {
    let args = match params.args {
        None => None,
        Some(Value::Object(map)) => Some(map),
        Some(other) => {
            return Ok(DaemonResponse::error(format!(
                "tool args must be a JSON object, got: {other}"
            )));
        }
    };

    let acquired = match state
        .pool
        .acquire(&params.server, &params.config, &params.config_source)
        .await
    {
        Ok(acquired) => acquired,
        Err(error) => return Ok(DaemonResponse::error(error.to_string())),
    };

    let outcome = acquired.session.call_tool(&params.tool, args).await;
    state.pool.touch(&params.server).await;

    match outcome {
        Ok(result) if result.is_error == Some(true) => {
            let text: Vec<String> = result
                .content
                .iter()
                .filter_map(|content| content.as_text())
                .map(|text| text.text.clone())
                .collect();
            let message = if text.is_empty() {
                format!("tool '{}' returned an error", params.tool)
            } else {
                text.join("\n")
            };
            Ok(DaemonResponse::error(message))
        }
        Ok(result) => Ok(DaemonResponse {
            result: Some(serde_json::to_value(&result)?),
            ..DaemonResponse::default()
        }),
        Err(error) => Ok(DaemonResponse::error(format!("{error:#}"))),
    }
}

#[cfg(test)]
#[path = "serve_tests.rs"]
mod tests;
