use serde::Serialize;

use mcpx_core::types::{OutputFormat, ToolInfo};

/// One server's slice of a fan-out listing. A failed server keeps its
/// row with `error` set instead of dropping out of the output.
#[derive(Debug, Clone, Serialize)]
pub struct ServerListing {
    pub server: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    pub tools: Vec<ToolInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn print_listings(format: OutputFormat, listings: &[ServerListing]) {
    match format {
        OutputFormat::Json => print_json(&listings),
        OutputFormat::Text => {
            for listing in listings {
                match &listing.error {
                    Some(error) => println!("{}: error: {}", listing.server, error),
                    None => {
                        println!("{} ({} tools)", listing.server, listing.tools.len());
                        for tool in &listing.tools {
                            match &tool.description {
                                Some(description) => {
                                    println!("  {}  {}", tool.name, first_line(description));
                                }
                                None => println!("  {}", tool.name),
                            }
                        }
                    }
                }
            }
        }
    }
}

pub fn print_matches(format: OutputFormat, matches: &[(String, ToolInfo)]) {
    match format {
        OutputFormat::Json => {
            let rows: Vec<serde_json::Value> = matches
                .iter()
                .map(|(server, tool)| {
                    serde_json::json!({
                        "server": server,
                        "tool": tool,
                    })
                })
                .collect();
            print_json(&rows);
        }
        OutputFormat::Text => {
            for (server, tool) in matches {
                match &tool.description {
                    Some(description) => {
                        println!("{}/{}  {}", server, tool.name, first_line(description));
                    }
                    None => println!("{}/{}", server, tool.name),
                }
            }
        }
    }
}

pub fn print_tool_info(format: OutputFormat, server: &str, tool: &ToolInfo) {
    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "server": server,
            "tool": tool,
        })),
        OutputFormat::Text => {
            println!("{}/{}", server, tool.name);
            if let Some(description) = &tool.description {
                println!("{description}");
            }
            println!("input schema:");
            println!(
                "{}",
                serde_json::to_string_pretty(&tool.input_schema)
                    .unwrap_or_else(|_| tool.input_schema.to_string())
            );
        }
    }
}

/// Render a tool-call result. Text mode prints each text content block;
/// anything non-textual falls back to JSON.
pub fn print_call_result(format: OutputFormat, result: &serde_json::Value) {
    match format {
        OutputFormat::Json => print_json(result),
        OutputFormat::Text => {
            let blocks = result.get("content").and_then(|c| c.as_array());
            match blocks {
                Some(blocks) if !blocks.is_empty() => {
                    for block in blocks {
                        match block.get("text").and_then(|t| t.as_str()) {
                            Some(text) => println!("{text}"),
                            None => println!("{block}"),
                        }
                    }
                }
                _ => print_json(result),
            }
        }
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(rendered) => println!("{rendered}"),
        Err(error) => tracing::error!(error = %error, "failed to render JSON output"),
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_serializes_without_empty_optionals() {
        let listing = ServerListing {
            server: "fs".into(),
            instructions: None,
            tools: vec![],
            error: None,
        };
        let value = serde_json::to_value(&listing).unwrap();
        assert!(value.get("error").is_none());
        assert!(value.get("instructions").is_none());
        assert_eq!(value["tools"], serde_json::json!([]));
    }

    #[test]
    fn test_first_line_truncates_multiline_descriptions() {
        assert_eq!(first_line("Open a URL\nMore detail"), "Open a URL");
        assert_eq!(first_line(""), "");
    }
}
