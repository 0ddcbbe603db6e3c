//! Shared mock MCP server for pool and daemon tests: a shell script
//! speaking line-framed JSON-RPC with per-process state, so session
//! reuse is observable (a fresh process forgets `navigate`).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;

use mcpx_config::ServerConfig;

pub(crate) fn stateful_script(dir: &Path) -> Result<PathBuf> {
    let path = dir.join("mock-browser-mcp.sh");
    fs::write(
        &path,
        r#"#!/bin/sh
state=""
while IFS= read -r line; do
  id=$(printf '%s\n' "$line" | sed -n 's/.*"id"[ ]*:[ ]*\([^,}]*\).*/\1/p')
  case "$line" in
    *\"initialize\"*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"protocolVersion":"2024-11-05","capabilities":{"tools":{}},"serverInfo":{"name":"mock-browser","version":"0.1.0"}}}\n' "$id"
      ;;
    *\"notifications/initialized\"*)
      ;;
    *\"tools/list\"*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"tools":[{"name":"navigate","description":"open a url","inputSchema":{"type":"object","properties":{"url":{"type":"string"}},"required":["url"]}},{"name":"text","description":"page text","inputSchema":{"type":"object","properties":{}}},{"name":"boom","description":"always fails","inputSchema":{"type":"object","properties":{}}}]}}\n' "$id"
      ;;
    *\"name\":\"navigate\"*)
      state=$(printf '%s\n' "$line" | sed -n 's/.*"url"[ ]*:[ ]*"\([^"]*\)".*/\1/p')
      printf '{"jsonrpc":"2.0","id":%s,"result":{"content":[{"type":"text","text":"navigated"}]}}\n' "$id"
      ;;
    *\"name\":\"text\"*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"content":[{"type":"text","text":"%s"}]}}\n' "$id" "$state"
      ;;
    *\"name\":\"boom\"*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"content":[{"type":"text","text":"kaboom"}],"isError":true}}\n' "$id"
      ;;
    *\"tools/call\"*)
      printf '{"jsonrpc":"2.0","id":%s,"error":{"code":-32602,"message":"unknown tool"}}\n' "$id"
      ;;
  esac
done
"#,
    )?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(&path)?.permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms)?;
    }

    Ok(path)
}

pub(crate) fn stdio_config(script: &Path) -> ServerConfig {
    serde_json::from_value(serde_json::json!({
        "command": "sh",
        "args": [script.to_string_lossy()],
    }))
    .expect("mock stdio config is valid")
}
