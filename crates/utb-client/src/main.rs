//! utbot CLI
//!
//! Generates unit tests through a running utbot service:
//! - `file`, `folder`, `project`: whole-source requests
//! - `function`, `line`, `class`: requests anchored at a source line
//! - `config`: inspect and edit the client configuration

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use utb_client::commands::{self, GenerateTarget};
use utb_client::output::print_warning;
use utb_core::config::{self, ClientConfig};
use utb_core::ConfigError;

#[derive(Parser)]
#[command(name = "utbot")]
#[command(author, version, about = "Client for the utbot test-generation service")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Service host (overrides config)
    #[arg(long, global = true)]
    host: Option<String>,

    /// Service port (overrides config)
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Build target to generate against
    #[arg(long, global = true)]
    target: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate tests for one source file
    File { path: PathBuf },

    /// Generate tests for every source under a folder
    Folder { path: PathBuf },

    /// Generate tests for the whole project
    Project,

    /// Generate tests for the function enclosing a line
    Function {
        path: PathBuf,
        /// 1-based line number
        #[arg(short, long)]
        line: u32,
    },

    /// Generate tests covering one line
    Line {
        path: PathBuf,
        #[arg(short, long)]
        line: u32,
    },

    /// Generate tests for the class enclosing a line
    Class {
        path: PathBuf,
        #[arg(short, long)]
        line: u32,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Show config file path
    Path,
    /// Write the default configuration
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
    /// Get a value, e.g. `server.port`
    Get { key: String },
    /// Set a value, e.g. `server.port 2121`
    Set { key: String, value: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    let target = match cli.command {
        Commands::Config { action } => {
            let path = cli.config.as_ref();
            return match action {
                ConfigAction::Show => commands::config_show(path),
                ConfigAction::Path => commands::config_path(path),
                ConfigAction::Init { force } => commands::config_init(path, force),
                ConfigAction::Get { key } => commands::config_get(path, &key),
                ConfigAction::Set { key, value } => commands::config_set(path, &key, &value),
            };
        }
        Commands::File { path } => GenerateTarget::File(path),
        Commands::Folder { path } => GenerateTarget::Folder(path),
        Commands::Project => GenerateTarget::Project,
        Commands::Function { path, line } => GenerateTarget::Function { file: path, line },
        Commands::Line { path, line } => GenerateTarget::Line { file: path, line },
        Commands::Class { path, line } => GenerateTarget::Class { file: path, line },
    };

    let mut config = load_client_config(cli.config.as_ref())?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    config.validate()?;

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    let completed = commands::generate_command(&config, target, cli.target, cancel).await?;
    if !completed {
        std::process::exit(1);
    }

    Ok(())
}

/// Explicit paths must exist; a missing default file means defaults
fn load_client_config(path: Option<&PathBuf>) -> Result<ClientConfig> {
    match path {
        Some(path) => config::load_config(path)
            .with_context(|| format!("Failed to load config from {:?}", path)),
        None => {
            let default_path = config::default_config_path();
            match config::load_config(&default_path) {
                Ok(config) => Ok(config),
                Err(ConfigError::NotFound(_)) => Ok(ClientConfig::default()),
                Err(e) => {
                    print_warning(&format!("Ignoring {:?}: {}", default_path, e));
                    Ok(ClientConfig::default())
                }
            }
        }
    }
}

/// Cancel the running request on Ctrl+C or SIGTERM
fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C, cancelling request");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, cancelling request");
            }
        }

        cancel.cancel();
    });
}
