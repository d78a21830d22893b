//! TimeMap CLI
//!
//! One daemon owns the Pomodoro timer; every other invocation is a surface:
//! - `timemap daemon` runs the coordinator
//! - `timemap start|pause|reset|mode` relay commands
//! - `timemap watch` keeps a live countdown on screen

use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser};

use timemap::cli::{
    parse_setting_value, run_surface, Cli, Commands, Display, IpcClient, SettingsCommand,
    TerminalView,
};
use timemap::config::Config;
use timemap::daemon;
use timemap::types::TimerMode;

/// Main entry point
#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    init_tracing(&cli);

    if let Err(e) = execute(cli).await {
        Display::show_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

/// Initializes the tracing subscriber for logging.
///
/// `RUST_LOG` wins over the defaults: `debug` with `--verbose`, `info` for
/// the daemon, `warn` otherwise.
fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_level = if cli.verbose {
        "debug"
    } else if matches!(cli.command, Some(Commands::Daemon)) {
        "info"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

/// Loads the configuration named on the command line, or the default one.
fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

/// Executes the CLI command.
async fn execute(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_ref())?;
    let socket_path = cli
        .socket
        .clone()
        .unwrap_or_else(|| config.socket_path());
    tracing::debug!("Using socket {}", socket_path.display());

    let client = IpcClient::with_socket_path(socket_path.clone());

    match cli.command {
        Some(Commands::Daemon) => {
            daemon::run(&config, &socket_path).await?;
        }
        Some(Commands::Start) => {
            let response = client.start().await?;
            Display::show_command_result(&response);
        }
        Some(Commands::Pause) => {
            let response = client.pause().await?;
            Display::show_command_result(&response);
        }
        Some(Commands::Reset) => {
            let response = client.reset().await?;
            Display::show_command_result(&response);
        }
        Some(Commands::Mode(args)) => {
            let mode = TimerMode::from(args.mode);
            let minutes = args
                .minutes
                .unwrap_or_else(|| config.pomodoro.minutes_for(mode));
            let response = client.switch_mode(mode, minutes).await?;
            Display::show_command_result(&response);
        }
        Some(Commands::Status) => {
            let response = client.status().await?;
            Display::show_status(&response);
        }
        Some(Commands::Watch) => {
            let stream = client.subscribe().await?;
            let mut view = TerminalView::new(std::io::stdout());
            run_surface(stream, &mut view, config.tick_interval()).await?;
            println!();
        }
        Some(Commands::Settings(SettingsCommand::Get { key })) => {
            let value = client.get_setting(key.as_deref()).await?;
            Display::show_setting(&value);
        }
        Some(Commands::Settings(SettingsCommand::Set { key, value })) => {
            let response = client.set_setting(&key, parse_setting_value(&value)).await?;
            Display::show_command_result(&response);
        }
        Some(Commands::Completions { shell }) => {
            generate_completions(shell);
        }
        None => {
            // No command provided, show help
            Cli::command().print_help()?;
        }
    }

    Ok(())
}

/// Generates shell completion scripts.
fn generate_completions(shell: clap_complete::Shell) {
    use clap_complete::generate;
    use std::io;

    let mut cmd = Cli::command();
    let bin_name = cmd.get_name().to_string();
    generate(shell, &mut cmd, bin_name, &mut io::stdout());
}

// ============================================================================
// Tests
// ============================================================================
