use std::time::Duration;

use serde_json::{Map, Value};

use mcpx_client::{RetryConfig, open_session};
use mcpx_config::{Settings, load_config};
use mcpx_core::types::OutputFormat;
use mcpx_core::{McpxError, Result};
use mcpx_daemon::{CallParams, DaemonClient, DaemonRequest, ServerParam};

use crate::filter::ensure_callable;
use crate::list_cmd::resolve_server;
use crate::output;
use crate::suggest::did_you_mean;
use crate::target::Target;

/// `mcpx call <server/tool> [json]` — the invocation router.
///
/// Routing: if the daemon socket exists and the daemon holds a session
/// for the target server, the call goes through the daemon (stateful
/// workflows keep their session); otherwise an ephemeral session is
/// opened and closed around the single call.
pub async fn handle_call(
    target: &str,
    args: Option<String>,
    config_arg: Option<&str>,
    format: OutputFormat,
    settings: &Settings,
) -> Result<()> {
    let target = Target::parse(target)?;
    let doc = load_config(config_arg)?;
    doc.require_servers()?;
    let config = resolve_server(&doc, &target.server)?.clone();
    let config_source = doc.source.to_string();

    // Filtered-out tools are refused before any session is opened.
    ensure_callable(&config, &target.server, &target.tool)?;

    let args = match args {
        Some(raw) => parse_args_json(&raw)?,
        None => read_stdin_args(settings.timeout).await?,
    };

    let daemon = DaemonClient::new(settings.socket_path.clone());
    if daemon.socket_exists() && daemon_has_server(&daemon, &target.server).await {
        let response = daemon
            .request(&DaemonRequest::Call(CallParams {
                server: target.server.clone(),
                config,
                config_source,
                tool: target.tool.clone(),
                args: args.map(Value::Object),
            }))
            .await?;

        return match response.result {
            Some(result) => {
                output::print_call_result(format, &result);
                Ok(())
            }
            None => {
                let message = response
                    .error
                    .unwrap_or_else(|| "daemon returned neither result nor error".to_string());
                Err(classify_call_error(&target, &message))
            }
        };
    }

    call_ephemeral(&target, &config, args, format, settings).await
}

async fn call_ephemeral(
    target: &Target,
    config: &mcpx_config::ServerConfig,
    args: Option<Map<String, Value>>,
    format: OutputFormat,
    settings: &Settings,
) -> Result<()> {
    let retry = RetryConfig::from_settings(settings);
    let session = open_session(&target.server, config, &retry, retry.deadline()).await?;

    let outcome = match session.call_tool(&target.tool, args).await {
        Ok(result) if result.is_error == Some(true) => {
            Err(McpxError::tool_failed(
                &target.server,
                &target.tool,
                tool_error_text(&result),
            ))
        }
        Ok(result) => serde_json::to_value(&result)
            .map_err(|error| McpxError::tool_failed(&target.server, &target.tool, error.to_string())),
        Err(error) => {
            // Best-effort hint: the session may still be able to tell us
            // what the server actually offers.
            if let Ok(tools) = session.list_tools().await
                && let Some(closest) =
                    did_you_mean(&target.tool, tools.iter().map(|t| t.name.as_str()))
            {
                eprintln!("did you mean '{}/{}'?", target.server, closest);
            }
            Err(classify_call_error(target, &format!("{error:#}")))
        }
    };

    session.close().await;

    let result = outcome?;
    output::print_call_result(format, &result);
    Ok(())
}

async fn daemon_has_server(daemon: &DaemonClient, server: &str) -> bool {
    match daemon
        .request(&DaemonRequest::Has(ServerParam {
            server: server.to_string(),
        }))
        .await
    {
        Ok(response) => response.has == Some(true),
        Err(error) => {
            tracing::debug!(error = %error, "daemon probe failed, using ephemeral session");
            false
        }
    }
}

/// `"not found"` / `"unknown tool"` classify as tool-not-found; anything
/// else is a tool execution failure.
pub(crate) fn classify_call_error(target: &Target, message: &str) -> McpxError {
    let lowered = message.to_lowercase();
    if lowered.contains("not found") || lowered.contains("unknown tool") {
        McpxError::ToolNotFound {
            tool: target.tool.clone(),
            server: target.server.clone(),
        }
    } else {
        McpxError::tool_failed(&target.server, &target.tool, message)
    }
}

/// Parse explicit JSON arguments; only an object (or null) is accepted.
pub(crate) fn parse_args_json(raw: &str) -> Result<Option<Map<String, Value>>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let value: Value = serde_json::from_str(trimmed)?;
    match value {
        Value::Object(map) => Ok(Some(map)),
        Value::Null => Ok(None),
        other => Err(McpxError::usage(format!(
            "tool arguments must be a JSON object, got: {other}"
        ))),
    }
}

/// With no explicit args and a non-terminal stdin, read arguments from
/// stdin until EOF under the shared budget. The timeout future is
/// dropped on completion, so no timer outlives the read.
async fn read_stdin_args(budget: Duration) -> Result<Option<Map<String, Value>>> {
    use std::io::IsTerminal;
    use tokio::io::AsyncReadExt;

    if std::io::stdin().is_terminal() {
        return Ok(None);
    }

    let mut input = String::new();
    match tokio::time::timeout(budget, tokio::io::stdin().read_to_string(&mut input)).await {
        Ok(Ok(_)) => parse_args_json(&input),
        Ok(Err(error)) => Err(McpxError::usage(format!(
            "failed to read tool arguments from stdin: {error}"
        ))),
        Err(_) => Err(McpxError::StdinTimeout(budget.as_secs())),
    }
}

fn tool_error_text(result: &rmcp::model::CallToolResult) -> String {
    let text: Vec<String> = result
        .content
        .iter()
        .filter_map(|content| content.as_text())
        .map(|text| text.text.clone())
        .collect();
    if text.is_empty() {
        "tool returned an error".to_string()
    } else {
        text.join("\n")
    }
}
