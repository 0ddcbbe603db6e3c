use clap::{Parser, Subcommand};
use mcpx_core::types::OutputFormat;

#[derive(Parser)]
#[command(name = "mcpx", version)]
#[command(about = "MCP tool broker: discover and invoke tools on configured MCP servers")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path or inline JSON
    #[arg(short = 'c', long = "config", global = true, value_name = "PATH|JSON")]
    pub config: Option<String>,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List tools on all configured servers (or one)
    List {
        /// Restrict listing to one server
        server: Option<String>,
    },

    /// Search tools across servers by glob pattern
    Search {
        /// Glob over tool names; include a '/' to match server/tool
        pattern: String,
    },

    /// Show a tool's description and input schema
    Info {
        /// Target as server/tool
        target: String,
    },

    /// Invoke a tool with JSON arguments
    Call {
        /// Target as server/tool
        target: String,

        /// JSON object with tool arguments; read from stdin if omitted
        args: Option<String>,
    },

    /// Manage the connection daemon
    Daemon {
        #[command(subcommand)]
        cmd: DaemonCommands,
    },
}

#[derive(Subcommand)]
pub enum DaemonCommands {
    /// Start the daemon in the background
    Start,

    /// Show daemon status and pooled sessions
    Status,

    /// Stop the daemon and release its sessions
    Stop {
        /// Stop even when multiple servers are pooled
        #[arg(long)]
        force: bool,
    },

    /// Open (or reuse) a pooled session for a server
    Connect {
        /// Server name from the config
        server: String,
    },

    /// Close a server's pooled session
    Disconnect {
        /// Server name from the config
        server: String,
    },

    /// Run the daemon in the foreground (spawned internally by start)
    #[command(hide = true)]
    Run,
}
