use std::sync::LazyLock;
use std::time::{Duration, Instant};

use rand::Rng;
use regex::Regex;

use mcpx_config::Settings;

const BUDGET_HEADROOM: Duration = Duration::from_secs(1);
const MAX_DELAY_CEILING_MS: u64 = 10_000;

/// Error-code tokens that mark a failure as safe to retry.
const TRANSIENT_CODES: &[&str] = &[
    "ECONNREFUSED",
    "ECONNRESET",
    "ETIMEDOUT",
    "ENOTFOUND",
    "EPIPE",
    "ENETUNREACH",
    "EHOSTUNREACH",
    "EAI_AGAIN",
];

static HTTP_STATUS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:(?:http\s+)?(?:status(?:\s+code)?|error)\s*:?\s*)?(429|502|503|504)\b")
        .expect("http status regex is valid")
});

static TRANSIENT_MESSAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)network\s+(error|fail|unavailable|timeout)|connection\s+(reset|refused|timeout)|\btimed?\s*out\b|\btimeout\b",
    )
    .expect("transient message regex is valid")
});

/// Retry knobs derived from the env-settings at call time.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub total_budget_ms: u64,
}

impl RetryConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        let total_budget_ms = settings.total_budget_ms();
        Self {
            max_retries: settings.max_retries,
            base_delay_ms: settings.retry_delay_ms,
            max_delay_ms: MAX_DELAY_CEILING_MS.min(total_budget_ms.saturating_sub(5_000) / 2),
            total_budget_ms,
        }
    }

    /// Deadline for the whole user operation, shared by every retried
    /// step and the stdin read.
    pub fn deadline(&self) -> Instant {
        Instant::now() + Duration::from_millis(self.total_budget_ms)
    }

    /// Backoff for 0-indexed attempt `n`: `min(base·2ⁿ, max)` with
    /// uniform ±25% jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponential = self
            .base_delay_ms
            .saturating_mul(1u64 << attempt.min(20));
        let capped = exponential.min(self.max_delay_ms.max(1));
        let jittered = capped as f64 * rand::thread_rng().gen_range(0.75..=1.25);
        Duration::from_millis(jittered as u64)
    }
}

/// Classify a failure as transient (retryable) or terminal.
///
/// Transient iff the error chain carries a retryable `io::ErrorKind`, a
/// known error-code token, a retryable HTTP status at the start of the
/// message (optionally behind a status-word preamble), or a recognized
/// network/connection/timeout phrase.
pub fn is_transient(error: &anyhow::Error) -> bool {
    for cause in error.chain() {
        if let Some(io_error) = cause.downcast_ref::<std::io::Error>()
            && is_transient_io_kind(io_error.kind())
        {
            return true;
        }
    }

    let message = format!("{error:#}");
    if TRANSIENT_CODES.iter().any(|code| message.contains(code)) {
        return true;
    }
    HTTP_STATUS_RE.is_match(message.trim()) || TRANSIENT_MESSAGE_RE.is_match(&message)
}

fn is_transient_io_kind(kind: std::io::ErrorKind) -> bool {
    use std::io::ErrorKind;
    matches!(
        kind,
        ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::TimedOut
            | ErrorKind::HostUnreachable
            | ErrorKind::NetworkUnreachable
    )
}

/// Run `operation` under the retry policy against a shared deadline.
///
/// Retries only transient failures, only while attempts remain, and only
/// while at least one second of budget is left; each delay is clamped to
/// the remaining budget minus that headroom. Exhaustion and terminal
/// failures surface the last error verbatim.
pub async fn with_retry<T, F, Fut>(
    label: &str,
    config: &RetryConfig,
    deadline: Instant,
    mut operation: F,
) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if attempt >= config.max_retries
                    || remaining <= BUDGET_HEADROOM
                    || !is_transient(&error)
                {
                    return Err(error);
                }

                let delay = config
                    .delay_for_attempt(attempt)
                    .min(remaining - BUDGET_HEADROOM);
                tracing::debug!(
                    op = label,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn err(message: &str) -> anyhow::Error {
        anyhow::anyhow!("{message}")
    }

    fn test_config(max_retries: u32, base_delay_ms: u64) -> RetryConfig {
        RetryConfig {
            max_retries,
            base_delay_ms,
            max_delay_ms: 10_000,
            total_budget_ms: 60_000,
        }
    }

    #[test]
    fn test_transient_error_codes() {
        for code in TRANSIENT_CODES {
            assert!(
                is_transient(&err(&format!("connect failed: {code}"))),
                "{code} should be transient"
            );
        }
    }

    #[test]
    fn test_transient_http_statuses() {
        assert!(is_transient(&err("429 Too Many Requests")));
        assert!(is_transient(&err("status 502: bad gateway")));
        assert!(is_transient(&err("HTTP status code 503")));
        assert!(is_transient(&err("error: 504")));
    }

    #[test]
    fn test_http_status_not_matched_mid_message() {
        assert!(!is_transient(&err("tool returned value 502 in payload")));
    }

    #[test]
    fn test_transient_message_patterns() {
        assert!(is_transient(&err("Network error while fetching")));
        assert!(is_transient(&err("network unavailable")));
        assert!(is_transient(&err("Connection reset by peer")));
        assert!(is_transient(&err("connection refused")));
        assert!(is_transient(&err("request timeout")));
        assert!(is_transient(&err("operation timed out")));
    }

    #[test]
    fn test_non_transient_errors() {
        for message in [
            "EACCES: permission denied",
            "ENOENT: no such file or directory",
            "401 Unauthorized",
            "403 Forbidden",
            "validation_error: bad input schema",
        ] {
            assert!(!is_transient(&err(message)), "{message} should be terminal");
        }
    }

    #[test]
    fn test_transient_io_kind_in_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let wrapped = anyhow::Error::from(io).context("opening session");
        assert!(is_transient(&wrapped));
    }

    #[test]
    fn test_delay_within_jitter_bounds() {
        let config = test_config(3, 100);
        for attempt in 0..4 {
            let nominal = (100u64 << attempt).min(config.max_delay_ms);
            let delay = config.delay_for_attempt(attempt).as_millis() as u64;
            let low = nominal * 3 / 4;
            let high = nominal * 5 / 4;
            assert!(
                (low..=high).contains(&delay),
                "attempt {attempt}: delay {delay} outside [{low}, {high}]"
            );
        }
    }

    #[test]
    fn test_delay_caps_at_max() {
        let config = RetryConfig {
            max_retries: 10,
            base_delay_ms: 1000,
            max_delay_ms: 2000,
            total_budget_ms: 60_000,
        };
        let delay = config.delay_for_attempt(10).as_millis() as u64;
        assert!(delay <= 2500, "got {delay}");
    }

    #[test]
    fn test_max_delay_derivation() {
        let settings_like = RetryConfig::from_settings(&settings_with_timeout_secs(1800));
        assert_eq!(settings_like.max_delay_ms, 10_000);

        let short = RetryConfig::from_settings(&settings_with_timeout_secs(15));
        assert_eq!(short.max_delay_ms, 5_000);
    }

    fn settings_with_timeout_secs(secs: u64) -> Settings {
        // Settings has no public constructor by design; round-trip the
        // one knob under test through the env-shaped default.
        let mut settings = Settings::from_env();
        settings.timeout = Duration::from_secs(secs);
        settings
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_failure() {
        let attempts = AtomicU32::new(0);
        let config = test_config(3, 10);
        let start = Instant::now();

        let result = with_retry("connect", &config, config.deadline(), || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(err("ECONNREFUSED"))
                } else {
                    Ok(42)
                }
            }
        })
        .await
        .unwrap();

        let elapsed = start.elapsed();
        assert_eq!(result, 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert!(
            elapsed >= Duration::from_millis(7) && elapsed <= Duration::from_millis(50),
            "elapsed {elapsed:?} outside expected backoff window"
        );
    }

    #[tokio::test]
    async fn test_terminal_error_not_retried() {
        let attempts = AtomicU32::new(0);
        let config = test_config(3, 10);

        let result: anyhow::Result<()> =
            with_retry("connect", &config, config.deadline(), || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(err("EACCES: permission denied")) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausted_budget_fails_without_retry() {
        let attempts = AtomicU32::new(0);
        let config = test_config(3, 10);
        let expired = Instant::now();

        let result: anyhow::Result<()> = with_retry("connect", &config, expired, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(err("ECONNREFUSED")) }
        })
        .await;

        let message = format!("{:#}", result.unwrap_err());
        assert!(message.contains("ECONNREFUSED"), "got: {message}");
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_exhausted_surfaces_last_error() {
        let attempts = AtomicU32::new(0);
        let config = test_config(2, 1);

        let result: anyhow::Result<()> =
            with_retry("connect", &config, config.deadline(), || {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move { Err(err(&format!("ECONNRESET attempt {n}"))) }
            })
            .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert!(result.unwrap_err().to_string().contains("attempt 2"));
    }
}
