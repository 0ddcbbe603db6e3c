use mcpx_client::{RetryConfig, open_session, run_bounded, with_retry};
use mcpx_config::{ConfigDocument, ServerConfig, Settings, load_config};
use mcpx_core::types::OutputFormat;
use mcpx_core::{McpxError, Result};

use crate::filter::filter_tools;
use crate::output::{self, ServerListing};
use crate::suggest::did_you_mean;
use crate::target::Target;

/// `mcpx list [server]`
pub async fn handle_list(
    server: Option<String>,
    config_arg: Option<&str>,
    format: OutputFormat,
    settings: &Settings,
) -> Result<()> {
    let doc = load_config(config_arg)?;
    let listings = collect_listings(&doc, server.as_deref(), settings).await?;
    output::print_listings(format, &listings);
    Ok(())
}

/// `mcpx search <glob>`
pub async fn handle_search(
    pattern: &str,
    config_arg: Option<&str>,
    format: OutputFormat,
    settings: &Settings,
) -> Result<()> {
    let compiled = glob::Pattern::new(pattern)
        .map_err(|error| McpxError::usage(format!("invalid glob '{pattern}': {error}")))?;
    let qualified = pattern.contains('/');

    let doc = load_config(config_arg)?;
    let listings = collect_listings(&doc, None, settings).await?;

    let mut matches: Vec<(String, mcpx_core::types::ToolInfo)> = Vec::new();
    for listing in listings {
        if listing.error.is_some() {
            continue;
        }
        for tool in listing.tools {
            let matched = if qualified {
                compiled.matches(&format!("{}/{}", listing.server, tool.name))
            } else {
                compiled.matches(&tool.name)
            };
            if matched {
                matches.push((listing.server.clone(), tool));
            }
        }
    }

    output::print_matches(format, &matches);
    Ok(())
}

/// `mcpx info <server/tool>`
pub async fn handle_info(
    target: &str,
    config_arg: Option<&str>,
    format: OutputFormat,
    settings: &Settings,
) -> Result<()> {
    let target = Target::parse(target)?;
    let doc = load_config(config_arg)?;
    doc.require_servers()?;
    let config = resolve_server(&doc, &target.server)?.clone();

    let retry = RetryConfig::from_settings(settings);
    let deadline = retry.deadline();
    let session = open_session(&target.server, &config, &retry, deadline).await?;

    let listed = with_retry("tools/list", &retry, deadline, || session.list_tools()).await;
    let outcome = match listed {
        Ok(tools) => {
            let tools = filter_tools(&config, &target.server, tools);
            match tools.iter().find(|tool| tool.name == target.tool) {
                Some(tool) => {
                    output::print_tool_info(format, &target.server, tool);
                    Ok(())
                }
                None => {
                    if let Some(closest) =
                        did_you_mean(&target.tool, tools.iter().map(|t| t.name.as_str()))
                    {
                        eprintln!("did you mean '{}/{}'?", target.server, closest);
                    }
                    Err(McpxError::ToolNotFound {
                        tool: target.tool.clone(),
                        server: target.server.clone(),
                    })
                }
            }
        }
        Err(error) => Err(McpxError::connect_failed(
            &target.server,
            format!("{error:#}"),
        )),
    };

    session.close().await;
    outcome
}

/// Look up a server config, printing a "did you mean" hint on miss.
pub(crate) fn resolve_server<'doc>(
    doc: &'doc ConfigDocument,
    name: &str,
) -> Result<&'doc ServerConfig> {
    match doc.server(name) {
        Ok(config) => Ok(config),
        Err(error) => {
            if let Some(closest) = did_you_mean(name, doc.servers.keys().map(String::as_str)) {
                eprintln!("did you mean '{closest}'?");
            }
            Err(error)
        }
    }
}

/// Fan out over the selected servers with bounded concurrency. Each
/// server's failure lands in its own listing row; results come back in
/// input order, which is alphabetical because the config map is sorted.
async fn collect_listings(
    doc: &ConfigDocument,
    only: Option<&str>,
    settings: &Settings,
) -> Result<Vec<ServerListing>> {
    doc.require_servers()?;

    let servers: Vec<(String, ServerConfig)> = match only {
        Some(name) => vec![(name.to_string(), resolve_server(doc, name)?.clone())],
        None => doc
            .servers
            .iter()
            .map(|(name, config)| (name.clone(), config.clone()))
            .collect(),
    };

    let retry = RetryConfig::from_settings(settings);
    let deadline = retry.deadline();

    let listings = run_bounded(
        servers,
        settings.concurrency,
        move |(name, config), _index| async move {
            match open_session(&name, &config, &retry, deadline).await {
                Ok(session) => {
                    let listed =
                        with_retry("tools/list", &retry, deadline, || session.list_tools()).await;
                    let listing = match listed {
                        Ok(tools) => ServerListing {
                            instructions: session.instructions().map(str::to_string),
                            tools: filter_tools(&config, &name, tools),
                            error: None,
                            server: name,
                        },
                        Err(error) => ServerListing {
                            server: name,
                            instructions: None,
                            tools: Vec::new(),
                            error: Some(format!("{error:#}")),
                        },
                    };
                    session.close().await;
                    listing
                }
                Err(error) => ServerListing {
                    server: name,
                    instructions: None,
                    tools: Vec::new(),
                    error: Some(error.to_string()),
                },
            }
        },
    )
    .await;

    Ok(listings)
}
