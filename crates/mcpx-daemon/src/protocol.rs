use serde::{Deserialize, Serialize};
use serde_json::Value;

use mcpx_config::ServerConfig;

/// One request frame: `{ "method": "<name>", "params": { … } }`.
///
/// Methods without params (`list`, `list-detailed`, `shutdown`) omit the
/// `params` field entirely.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "kebab-case")]
pub enum DaemonRequest {
    Connect(ConnectParams),
    Call(CallParams),
    Disconnect(ServerParam),
    Has(ServerParam),
    List,
    ListDetailed,
    Shutdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectParams {
    pub server: String,
    pub config: ServerConfig,
    #[serde(rename = "configSource")]
    pub config_source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallParams {
    pub server: String,
    pub config: ServerConfig,
    #[serde(rename = "configSource")]
    pub config_source: String,
    pub tool: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerParam {
    pub server: String,
}

/// Pool introspection row returned by `list-detailed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerDetails {
    pub name: String,
    pub transport: String,
    pub config_source: String,
    pub idle_seconds: u64,
}

/// One response frame; every field is optional and methods set only the
/// fields their contract names.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaemonResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub servers: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub servers_detailed: Option<Vec<ServerDetails>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub already_connected: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DaemonResponse {
    pub fn ok() -> Self {
        Self {
            ok: Some(true),
            ..Self::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_list_request_has_no_params() {
        let request: DaemonRequest = serde_json::from_value(json!({"method": "list"})).unwrap();
        assert!(matches!(request, DaemonRequest::List));
        assert_eq!(
            serde_json::to_value(&DaemonRequest::List).unwrap(),
            json!({"method": "list"})
        );
    }

    #[test]
    fn test_list_detailed_method_name_is_kebab_case() {
        let value = serde_json::to_value(&DaemonRequest::ListDetailed).unwrap();
        assert_eq!(value["method"], "list-detailed");
    }

    #[test]
    fn test_connect_request_round_trip() {
        let raw = json!({
            "method": "connect",
            "params": {
                "server": "browser",
                "config": { "command": "browser-mcp" },
                "configSource": "<inline>"
            }
        });
        let request: DaemonRequest = serde_json::from_value(raw.clone()).unwrap();
        match &request {
            DaemonRequest::Connect(params) => {
                assert_eq!(params.server, "browser");
                assert_eq!(params.config_source, "<inline>");
            }
            other => panic!("expected Connect, got {other:?}"),
        }
        assert_eq!(serde_json::to_value(&request).unwrap(), raw);
    }

    #[test]
    fn test_unknown_method_fails() {
        let err =
            serde_json::from_value::<DaemonRequest>(json!({"method": "reboot"})).unwrap_err();
        assert!(err.to_string().contains("unknown variant"), "got: {err}");
    }

    #[test]
    fn test_missing_param_names_field() {
        let err = serde_json::from_value::<DaemonRequest>(json!({
            "method": "has",
            "params": {}
        }))
        .unwrap_err();
        assert!(err.to_string().contains("server"), "got: {err}");
    }

    #[test]
    fn test_response_wire_fields_are_camel_case() {
        let response = DaemonResponse {
            ok: Some(true),
            already_connected: Some(false),
            servers_detailed: Some(vec![ServerDetails {
                name: "fs".into(),
                transport: "stdio".into(),
                config_source: "<none>".into(),
                idle_seconds: 4,
            }]),
            ..DaemonResponse::default()
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["alreadyConnected"], false);
        assert_eq!(value["serversDetailed"][0]["idleSeconds"], 4);
        assert_eq!(value["serversDetailed"][0]["configSource"], "<none>");
        assert!(value.get("error").is_none());
        assert!(value.get("result").is_none());
    }
}
