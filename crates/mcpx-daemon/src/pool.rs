use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use mcpx_client::{McpSession, RetryConfig, open_session};
use mcpx_config::{ServerConfig, config_hash};
use mcpx_core::{McpxError, Result};

use crate::protocol::ServerDetails;

const EVICTION_TICK: Duration = Duration::from_secs(60);

/// Outcome of [`ConnectionPool::acquire`].
pub struct Acquired {
    pub session: Arc<McpSession>,
    pub already_connected: bool,
    pub reconnected: bool,
}

struct PoolEntry {
    session: Arc<McpSession>,
    config_hash: String,
    config_source: String,
    transport: &'static str,
    started_at: Instant,
    last_used: Instant,
}

struct PoolInner {
    entries: HashMap<String, PoolEntry>,
    /// Per-key acquire locks. Handlers dispatch concurrently, so
    /// single-flight per key must be explicit; the map only grows with
    /// distinct server names.
    key_locks: HashMap<String, Arc<Mutex<()>>>,
}

/// Keyed, lifetime-managed cache of live MCP sessions.
///
/// Entries are keyed by server name. An entry's `config_hash` always
/// matches the config that produced its session; a hash mismatch on
/// acquire closes the old session and reconnects.
pub struct ConnectionPool {
    retry: RetryConfig,
    idle_timeout: Duration,
    inner: Mutex<PoolInner>,
    eviction: CancellationToken,
}

impl ConnectionPool {
    /// Create the pool and start its idle-eviction timer.
    pub fn new(retry: RetryConfig, idle_timeout: Duration) -> Arc<Self> {
        let pool = Arc::new(Self {
            retry,
            idle_timeout,
            inner: Mutex::new(PoolInner {
                entries: HashMap::new(),
                key_locks: HashMap::new(),
            }),
            eviction: CancellationToken::new(),
        });

        let weak = Arc::downgrade(&pool);
        let cancel = pool.eviction.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(EVICTION_TICK);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            tick.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tick.tick() => {}
                }
                let Some(pool) = weak.upgrade() else { break };
                pool.evict_idle().await;
            }
        });

        pool
    }

    /// Acquire a session for `name`, reusing a pooled one when its config
    /// hash matches, reconnecting when it drifted, and opening a fresh
    /// one otherwise. Single-flight per key: concurrent acquires for one
    /// name share the in-progress open.
    pub async fn acquire(
        &self,
        name: &str,
        config: &ServerConfig,
        config_source: &str,
    ) -> Result<Acquired> {
        let hash = config_hash(config)
            .map_err(|e| McpxError::ConfigInvalid(format!("failed to hash config: {e}")))?;

        let key_lock = {
            let mut inner = self.inner.lock().await;
            inner
                .key_locks
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let _guard = key_lock.lock().await;

        let mut reconnected = false;
        let stale = {
            let mut inner = self.inner.lock().await;
            match inner.entries.get_mut(name) {
                Some(entry) if entry.config_hash == hash => {
                    entry.last_used = Instant::now();
                    return Ok(Acquired {
                        session: entry.session.clone(),
                        already_connected: true,
                        reconnected: false,
                    });
                }
                Some(_) => {
                    reconnected = true;
                    inner.entries.remove(name)
                }
                None => None,
            }
        };
        if let Some(entry) = stale {
            tracing::debug!(server = %name, "config hash changed, reconnecting");
            entry.session.close().await;
        }

        let session = Arc::new(
            open_session(name, config, &self.retry, self.retry.deadline()).await?,
        );

        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        inner.entries.insert(
            name.to_string(),
            PoolEntry {
                session: session.clone(),
                config_hash: hash,
                config_source: config_source.to_string(),
                transport: config.transport.label(),
                started_at: now,
                last_used: now,
            },
        );

        Ok(Acquired {
            session,
            already_connected: false,
            reconnected,
        })
    }

    /// Stamp `last_used` after a completed call.
    pub async fn touch(&self, name: &str) {
        let mut inner = self.inner.lock().await;
        if let Some(entry) = inner.entries.get_mut(name) {
            entry.last_used = Instant::now();
        }
    }

    /// Close and remove one entry; returns whether it was present.
    pub async fn release(&self, name: &str) -> bool {
        let entry = self.inner.lock().await.entries.remove(name);
        match entry {
            Some(entry) => {
                entry.session.close().await;
                true
            }
            None => false,
        }
    }

    /// Close every entry, stop idle eviction, and return the names that
    /// were held, sorted.
    pub async fn release_all(&self) -> Vec<String> {
        self.eviction.cancel();
        let entries: Vec<(String, PoolEntry)> =
            self.inner.lock().await.entries.drain().collect();
        let mut names = Vec::with_capacity(entries.len());
        for (name, entry) in entries {
            entry.session.close().await;
            names.push(name);
        }
        names.sort();
        names
    }

    pub async fn has(&self, name: &str) -> bool {
        self.inner.lock().await.entries.contains_key(name)
    }

    pub async fn list(&self) -> Vec<String> {
        let mut names: Vec<String> =
            self.inner.lock().await.entries.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn list_detailed(&self) -> Vec<ServerDetails> {
        let now = Instant::now();
        let inner = self.inner.lock().await;
        let mut details: Vec<ServerDetails> = inner
            .entries
            .iter()
            .map(|(name, entry)| ServerDetails {
                name: name.clone(),
                transport: entry.transport.to_string(),
                config_source: entry.config_source.clone(),
                idle_seconds: now.saturating_duration_since(entry.last_used).as_secs(),
            })
            .collect();
        details.sort_by(|a, b| a.name.cmp(&b.name));
        details
    }

    pub async fn size(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    /// Release entries idle past the threshold. Best-effort: run from the
    /// timer, never raises.
    pub async fn evict_idle(&self) {
        let now = Instant::now();
        let expired: Vec<(String, PoolEntry)> = {
            let mut inner = self.inner.lock().await;
            let names: Vec<String> = inner
                .entries
                .iter()
                .filter(|(_, entry)| {
                    now.saturating_duration_since(entry.last_used) > self.idle_timeout
                })
                .map(|(name, _)| name.clone())
                .collect();
            names
                .into_iter()
                .filter_map(|name| inner.entries.remove(&name).map(|entry| (name, entry)))
                .collect()
        };

        for (name, entry) in expired {
            let idle_secs = now.saturating_duration_since(entry.last_used).as_secs();
            tracing::debug!(server = %name, idle_secs, "evicting idle session");
            entry.session.close().await;
        }
    }

    #[cfg(test)]
    pub(crate) async fn entry_times(&self, name: &str) -> Option<(Instant, Instant)> {
        let inner = self.inner.lock().await;
        inner
            .entries
            .get(name)
            .map(|entry| (entry.started_at, entry.last_used))
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
