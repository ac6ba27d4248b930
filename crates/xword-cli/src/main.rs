//! xword CLI
//!
//! Command-line client for shared crossword games.

use std::fs::OpenOptions;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use xword_core::Config;

mod commands;
mod output;
mod puzzle;

use commands::play::PlayOptions;
use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "xword")]
#[command(about = "xword - Solve crosswords together")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Use this config file instead of the default
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Join a shared game, or play a puzzle offline
    Play {
        /// Game id on the server
        #[arg(short, long)]
        game: Option<String>,
        /// Puzzle file (a `create` payload)
        #[arg(short, long)]
        puzzle: Option<PathBuf>,
        /// Play locally without a server
        #[arg(long)]
        offline: bool,
        /// Watch without announcing yourself until `join`
        #[arg(long)]
        defer_join: bool,
        /// Mark entries right or wrong as they are typed
        #[arg(long)]
        autocheck: bool,
        /// Enter values in pencil
        #[arg(long)]
        pencil: bool,
    },
    /// Show the saved state of a game
    Show {
        /// Game id (or puzzle id for offline games)
        id: String,
        /// Puzzle file, to mark blocks and check the answers
        #[arg(short, long)]
        puzzle: Option<PathBuf>,
    },
    /// Delete the saved state of a game
    #[command(alias = "rm")]
    Forget {
        /// Game id (or puzzle id for offline games)
        id: String,
    },
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (server_url, display_name, color, offline, ...)
        key: String,
        /// Configuration value ("none" to unset)
        value: String,
    },
    /// Print the config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));
    let config_path = cli.config.as_ref();

    // A broken config file should still be fixable through `config set`
    if let Ok(config) = Config::load_with_cli_override(config_path) {
        init_logging(&config);
    }

    match cli.command {
        Commands::Play {
            game,
            puzzle,
            offline,
            defer_join,
            autocheck,
            pencil,
        } => {
            let options = PlayOptions {
                puzzle,
                game,
                offline,
                defer_join,
                autocheck,
                pencil,
            };
            commands::play::play(options, config_path, &output).await
        }
        Commands::Show { id, puzzle } => commands::show::show(id, puzzle, config_path, &output),
        Commands::Forget { id } => commands::show::forget(id, config_path, &output),
        Commands::Config { command } => handle_config_command(command, config_path, &output),
    }
}

fn handle_config_command(
    command: Option<ConfigCommands>,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    match command {
        Some(ConfigCommands::Show) | None => commands::config::show(config_path, output),
        Some(ConfigCommands::Set { key, value }) => {
            commands::config::set(key, value, config_path, output)
        }
        Some(ConfigCommands::Path) => commands::config::path(config_path),
    }
}

/// Log to stderr, or to `log_file` when configured
///
/// The level comes from XWORD_LOG (e.g. `XWORD_LOG=debug`), default warn.
fn init_logging(config: &Config) {
    let log_level = std::env::var("XWORD_LOG").unwrap_or_else(|_| "warn".to_string());

    let env_filter = EnvFilter::new(format!("xword_core={},xword_cli={}", log_level, log_level));

    match &config.log_file {
        Some(log_path) => {
            let log_file = match OpenOptions::new().create(true).append(true).open(log_path) {
                Ok(f) => f,
                Err(e) => {
                    eprintln!("Warning: Could not open log file {:?}: {}", log_path, e);
                    return;
                }
            };
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(log_file)
                .try_init();
            info!("Logging to {:?}", log_path);
        }
        None => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .try_init();
        }
    }
}
