//! Persistent connection daemon: a keyed pool of live MCP sessions
//! shared across CLI invocations over a local UNIX socket.

mod client;
mod pool;
mod protocol;
mod serve;
mod socket;
#[cfg(test)]
mod test_fixtures;

pub use client::DaemonClient;
pub use pool::{Acquired, ConnectionPool};
pub use protocol::{
    CallParams, ConnectParams, DaemonRequest, DaemonResponse, ServerDetails, ServerParam,
};
pub use serve::run_daemon;

/// Internal sentinel set on the detached daemon child. Never user-set.
pub const DAEMON_SENTINEL_ENV: &str = "_MCPX_DAEMON";
