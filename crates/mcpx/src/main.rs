use clap::Parser;

mod call_cmd;
mod cli;
mod daemon_cmds;
mod filter;
mod list_cmd;
mod output;
mod suggest;
mod target;

use cli::{Cli, Commands, DaemonCommands};
use mcpx_config::Settings;
use mcpx_core::exit_code;

#[tokio::main]
async fn main() {
    // Env is read once at startup; later mutations are ignored.
    let settings = Settings::from_env();
    init_tracing(&settings);

    let cli = Cli::parse();
    let format = cli.format;
    let config_arg = cli.config.as_deref();

    let result = match cli.command {
        Commands::List { server } => {
            list_cmd::handle_list(server, config_arg, format, &settings).await
        }
        Commands::Search { pattern } => {
            list_cmd::handle_search(&pattern, config_arg, format, &settings).await
        }
        Commands::Info { target } => {
            list_cmd::handle_info(&target, config_arg, format, &settings).await
        }
        Commands::Call { target, args } => {
            call_cmd::handle_call(&target, args, config_arg, format, &settings).await
        }
        Commands::Daemon { cmd } => match cmd {
            DaemonCommands::Start => daemon_cmds::handle_start(&settings).await,
            DaemonCommands::Status => daemon_cmds::handle_status(&settings, format).await,
            DaemonCommands::Stop { force } => daemon_cmds::handle_stop(&settings, force).await,
            DaemonCommands::Connect { server } => {
                daemon_cmds::handle_connect(&server, config_arg, &settings).await
            }
            DaemonCommands::Disconnect { server } => {
                daemon_cmds::handle_disconnect(&server, &settings).await
            }
            DaemonCommands::Run => daemon_cmds::handle_run(&settings).await,
        },
    };

    if let Err(error) = result {
        eprintln!("error: {error}");
        if let Some(hint) = error.suggestion() {
            eprintln!("hint: {hint}");
        }
        std::process::exit(exit_code(&error));
    }
}

fn init_tracing(settings: &Settings) {
    let filter = if settings.debug {
        tracing_subscriber::EnvFilter::new(
            "mcpx=debug,mcpx_core=debug,mcpx_config=debug,mcpx_client=debug,mcpx_daemon=debug",
        )
    } else {
        tracing_subscriber::EnvFilter::from_default_env()
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .try_init()
        .ok();
}
