use mcpx_config::{Settings, load_config};
use mcpx_core::types::OutputFormat;
use mcpx_core::{McpxError, Result};
use mcpx_daemon::{ConnectParams, DaemonClient, DaemonRequest, ServerParam, run_daemon};

use crate::list_cmd::resolve_server;

/// `mcpx daemon start`
pub async fn handle_start(settings: &Settings) -> Result<()> {
    let client = DaemonClient::new(settings.socket_path.clone());
    if client.is_running().await {
        println!("daemon already running at {}", settings.socket_path.display());
        return Ok(());
    }
    client.ensure_running().await?;
    println!("daemon started at {}", settings.socket_path.display());
    Ok(())
}

/// `mcpx daemon status`
pub async fn handle_status(settings: &Settings, format: OutputFormat) -> Result<()> {
    let client = DaemonClient::new(settings.socket_path.clone());
    if !client.is_running().await {
        println!("daemon is not running at {}", settings.socket_path.display());
        return Ok(());
    }

    let response = client.request(&DaemonRequest::ListDetailed).await?;
    let servers = response.servers_detailed.unwrap_or_default();

    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "socket": settings.socket_path.display().to_string(),
                    "servers": servers,
                }))
                .unwrap_or_default()
            );
        }
        OutputFormat::Text => {
            println!("daemon running at {}", settings.socket_path.display());
            if servers.is_empty() {
                println!("no pooled sessions");
            }
            for server in servers {
                println!(
                    "  {}  transport={}  config={}  idle={}s",
                    server.name, server.transport, server.config_source, server.idle_seconds
                );
            }
        }
    }
    Ok(())
}

/// `mcpx daemon stop [--force]`
pub async fn handle_stop(settings: &Settings, force: bool) -> Result<()> {
    let client = DaemonClient::new(settings.socket_path.clone());
    let released = client.stop(force).await?;
    if released.is_empty() {
        println!("daemon stopped");
    } else {
        println!("daemon stopped, released: {}", released.join(", "));
    }
    Ok(())
}

/// `mcpx daemon connect <server>`
pub async fn handle_connect(
    server: &str,
    config_arg: Option<&str>,
    settings: &Settings,
) -> Result<()> {
    let doc = load_config(config_arg)?;
    doc.require_servers()?;
    let config = resolve_server(&doc, server)?.clone();

    let client = DaemonClient::new(settings.socket_path.clone());
    client.ensure_running().await?;

    let response = client
        .request(&DaemonRequest::Connect(ConnectParams {
            server: server.to_string(),
            config,
            config_source: doc.source.to_string(),
        }))
        .await?;

    if let Some(error) = response.error {
        return Err(McpxError::connect_failed(server, error));
    }
    if response.already_connected == Some(true) {
        println!("'{server}' already connected");
    } else {
        println!("'{server}' connected");
    }
    Ok(())
}

/// `mcpx daemon disconnect <server>`
pub async fn handle_disconnect(server: &str, settings: &Settings) -> Result<()> {
    let client = DaemonClient::new(settings.socket_path.clone());
    if !client.is_running().await {
        return Err(McpxError::Daemon(format!(
            "daemon is not running at {}",
            settings.socket_path.display()
        )));
    }

    let response = client
        .request(&DaemonRequest::Disconnect(ServerParam {
            server: server.to_string(),
        }))
        .await?;

    if response.ok == Some(true) {
        println!("'{server}' disconnected");
    } else {
        println!("'{server}' was not connected");
    }
    Ok(())
}

/// `mcpx daemon run` — the foreground daemon process, normally spawned
/// detached by `daemon start` with the internal sentinel set.
pub async fn handle_run(settings: &Settings) -> Result<()> {
    run_daemon(settings).await
}
