use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 1800;
const DEFAULT_CONCURRENCY: usize = 5;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_RETRY_DELAY_MS: u64 = 1000;
const DEFAULT_IDLE_TIMEOUT_MS: u64 = 300_000;

/// Environment-derived knobs, read once per process start.
///
/// Invalid or non-positive values fall back to the defaults rather than
/// erroring; these are tuning knobs, not configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Shared total budget for one user operation (`MCP_TIMEOUT`, seconds).
    pub timeout: Duration,
    /// Fan-out ceiling for batch operations (`MCP_CONCURRENCY`).
    pub concurrency: usize,
    /// Retry attempts for connect/list (`MCP_MAX_RETRIES`).
    pub max_retries: u32,
    /// Base backoff delay (`MCP_RETRY_DELAY`, milliseconds).
    pub retry_delay_ms: u64,
    /// Daemon socket path (`MCP_DAEMON_SOCKET`).
    pub socket_path: PathBuf,
    /// Pool idle eviction threshold (`MCP_DAEMON_IDLE_MS`).
    pub idle_timeout_ms: u64,
    /// Debug logging requested (`MCP_DEBUG` truthy).
    pub debug: bool,
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            timeout: Duration::from_secs(parse_positive(
                lookup("MCP_TIMEOUT"),
                DEFAULT_TIMEOUT_SECS,
            )),
            concurrency: parse_positive(lookup("MCP_CONCURRENCY"), DEFAULT_CONCURRENCY as u64)
                as usize,
            max_retries: parse_non_negative(lookup("MCP_MAX_RETRIES"), DEFAULT_MAX_RETRIES as u64)
                as u32,
            retry_delay_ms: parse_positive(lookup("MCP_RETRY_DELAY"), DEFAULT_RETRY_DELAY_MS),
            socket_path: lookup("MCP_DAEMON_SOCKET")
                .map(PathBuf::from)
                .unwrap_or_else(default_socket_path),
            idle_timeout_ms: parse_positive(lookup("MCP_DAEMON_IDLE_MS"), DEFAULT_IDLE_TIMEOUT_MS),
            debug: lookup("MCP_DEBUG").is_some_and(|v| is_truthy(&v)),
        }
    }

    /// Total budget in milliseconds, the unit the retry policy works in.
    pub fn total_budget_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }
}

/// Parse a value that must be a positive integer; anything else (missing,
/// non-numeric, zero, negative) yields the default.
fn parse_positive(value: Option<String>, default: u64) -> u64 {
    value
        .and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|&v| v > 0)
        .map(|v| v as u64)
        .unwrap_or(default)
}

/// Like [`parse_positive`] but zero is allowed (retries may be disabled).
fn parse_non_negative(value: Option<String>, default: u64) -> u64 {
    value
        .and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|&v| v >= 0)
        .map(|v| v as u64)
        .unwrap_or(default)
}

fn is_truthy(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "" | "0" | "false" | "no" | "off"
    )
}

/// `$MCP_DAEMON_SOCKET` is handled by the caller; the default lives under
/// the user's home so independent CLI processes agree on one path.
pub(crate) fn default_socket_path() -> PathBuf {
    directories::BaseDirs::new()
        .map(|base| base.home_dir().join(".mcp-cli"))
        .unwrap_or_else(|| PathBuf::from("/tmp/.mcp-cli"))
        .join("daemon.sock")
}
