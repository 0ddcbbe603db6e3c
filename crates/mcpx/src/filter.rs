use mcpx_config::ServerConfig;
use mcpx_core::{McpxError, Result, types::ToolInfo};

/// Check a glob against a tool. Patterns containing `/` match the
/// qualified `server/tool` name, bare patterns match the tool name.
fn pattern_matches(pattern: &str, server: &str, tool: &str) -> bool {
    let Ok(compiled) = glob::Pattern::new(pattern) else {
        tracing::warn!(pattern, "ignoring invalid tool-filter glob");
        return false;
    };
    if pattern.contains('/') {
        compiled.matches(&format!("{server}/{tool}"))
    } else {
        compiled.matches(tool)
    }
}

/// Refuse a call before any session is opened when the tool is filtered
/// out by config. Disabled wins over included.
pub fn ensure_callable(config: &ServerConfig, server: &str, tool: &str) -> Result<()> {
    if let Some(pattern) = config
        .disabled_tools
        .iter()
        .find(|pattern| pattern_matches(pattern, server, tool))
    {
        return Err(McpxError::ToolDisabled {
            tool: format!("{server}/{tool}"),
            pattern: pattern.clone(),
        });
    }

    if !config.include_tools.is_empty()
        && !config
            .include_tools
            .iter()
            .any(|pattern| pattern_matches(pattern, server, tool))
    {
        return Err(McpxError::ToolDisabled {
            tool: format!("{server}/{tool}"),
            pattern: "outside includeTools".to_string(),
        });
    }

    Ok(())
}

/// Apply the config's filters to a listing.
pub fn filter_tools(config: &ServerConfig, server: &str, tools: Vec<ToolInfo>) -> Vec<ToolInfo> {
    tools
        .into_iter()
        .filter(|tool| ensure_callable(config, server, &tool.name).is_ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(json: serde_json::Value) -> ServerConfig {
        serde_json::from_value(json).unwrap()
    }

    fn tool(name: &str) -> ToolInfo {
        ToolInfo {
            name: name.to_string(),
            description: None,
            input_schema: serde_json::json!({}),
        }
    }

    #[test]
    fn test_no_filters_allows_everything() {
        let config = config(serde_json::json!({ "command": "x" }));
        assert!(ensure_callable(&config, "fs", "read_file").is_ok());
    }

    #[test]
    fn test_disabled_glob_blocks_matching_tool() {
        let config = config(serde_json::json!({
            "command": "x",
            "disabledTools": ["write_*"]
        }));
        assert!(ensure_callable(&config, "fs", "read_file").is_ok());
        let err = ensure_callable(&config, "fs", "write_file").unwrap_err();
        assert!(err.to_string().contains("write_*"), "got: {err}");
    }

    #[test]
    fn test_star_slash_star_blocks_every_tool() {
        let config = config(serde_json::json!({
            "command": "x",
            "disabledTools": ["*/*"]
        }));
        let err = ensure_callable(&config, "fs", "read_file").unwrap_err();
        assert!(matches!(err, McpxError::ToolDisabled { .. }));
    }

    #[test]
    fn test_qualified_pattern_scopes_to_server() {
        let config = config(serde_json::json!({
            "command": "x",
            "disabledTools": ["browser/*"]
        }));
        assert!(ensure_callable(&config, "browser", "navigate").is_err());
        assert!(ensure_callable(&config, "fs", "navigate").is_ok());
    }

    #[test]
    fn test_include_tools_restricts_calls() {
        let config = config(serde_json::json!({
            "command": "x",
            "includeTools": ["read_*"]
        }));
        assert!(ensure_callable(&config, "fs", "read_file").is_ok());
        assert!(ensure_callable(&config, "fs", "write_file").is_err());
    }

    #[test]
    fn test_disabled_wins_over_included() {
        let config = config(serde_json::json!({
            "command": "x",
            "includeTools": ["read_*"],
            "disabledTools": ["read_secret"]
        }));
        assert!(ensure_callable(&config, "fs", "read_file").is_ok());
        assert!(ensure_callable(&config, "fs", "read_secret").is_err());
    }

    #[test]
    fn test_filter_tools_drops_blocked_entries() {
        let config = config(serde_json::json!({
            "command": "x",
            "disabledTools": ["write_*"]
        }));
        let filtered = filter_tools(
            &config,
            "fs",
            vec![tool("read_file"), tool("write_file"), tool("stat")],
        );
        let names: Vec<&str> = filtered.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["read_file", "stat"]);
    }

    #[test]
    fn test_invalid_glob_is_ignored() {
        let config = config(serde_json::json!({
            "command": "x",
            "disabledTools": ["[unclosed"]
        }));
        assert!(ensure_callable(&config, "fs", "read_file").is_ok());
    }
}
