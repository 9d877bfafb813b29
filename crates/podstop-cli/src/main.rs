//! podstop - stop the application server in a terminating pod
//!
//! Drains the data grid before stopping a member, retries while the grid
//! is rebalancing, and falls back to a node manager kill when the
//! management channel is unusable.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use podstop_core::ShutdownToken;

mod cmd;
mod config;

use config::Config;

/// Exit status for missing or invalid configuration
pub const EXIT_CONFIG: u8 = 1;

#[derive(Parser)]
#[command(name = "podstop")]
#[command(about = "Stop the application server in a terminating pod")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Config file path (default: ./podstop.toml or ~/.config/podstop/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Stop the local server (preStop hook entry point)
    Stop(Box<cmd::stop::StopArgs>),
    /// Report whether a domain configuration declares a data grid
    Detect(cmd::detect::DetectArgs),
    /// Show current configuration
    Config,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            // Help and version go to stdout and are not failures
            return if e.use_stderr() {
                ExitCode::from(EXIT_CONFIG)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    podstop_core::init_logging(cli.quiet, cli.debug);

    let config = match cli.config {
        Some(path) => Config::from_file(&path),
        None => Config::load(),
    };
    let config = match config {
        Ok(c) => c,
        Err(e) => {
            log::error!("Configuration error: {e:#}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    match cli.command {
        Command::Stop(args) => {
            let token = ShutdownToken::new();
            if let Err(e) = setup_signal_handler(&token) {
                log::warn!("Cannot install signal handlers: {e}");
            }
            cmd::stop::run(*args, &config, token)
        }
        Command::Detect(args) => cmd::detect::run(args),
        Command::Config => {
            cmd::config::run(&config);
            ExitCode::SUCCESS
        }
    }
}

fn setup_signal_handler(token: &ShutdownToken) -> std::io::Result<()> {
    // First signal: cancel the run at the next loop iteration
    // Second signal: exit immediately
    for signal in [signal_hook::consts::SIGTERM, signal_hook::consts::SIGINT] {
        let token = token.clone();
        // SAFETY: the handler only swaps an atomic and calls _exit, both async-signal-safe
        unsafe {
            signal_hook::low_level::register(signal, move || {
                if token.request() {
                    signal_hook::low_level::exit(130);
                }
            })?;
        }
    }
    Ok(())
}
