// ABOUTME: CLI entry point for exacttarget-replicator
// ABOUTME: Parses commands and routes to discover or sync

use anyhow::Context;
use clap::{Parser, Subcommand};
use exacttarget_replicator::commands;
use exacttarget_replicator::config::Config;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "exacttarget-replicator")]
#[command(about = "Replicate Marketing Cloud data extensions as JSON message streams", long_about = None)]
#[command(version)]
struct Cli {
    /// Set the log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover data extensions and print the catalog as JSON
    Discover {
        /// Config file (JSON, or TOML with a .toml extension)
        #[arg(long, env = "EXACTTARGET_REPLICATOR_CONFIG")]
        config: Option<PathBuf>,
    },
    /// Replicate the selected streams of a catalog to stdout
    Sync {
        /// Config file (JSON, or TOML with a .toml extension)
        #[arg(long, env = "EXACTTARGET_REPLICATOR_CONFIG")]
        config: Option<PathBuf>,
        /// Catalog produced by `discover` with streams marked selected
        #[arg(long)]
        catalog: PathBuf,
        /// State file to resume from
        #[arg(long)]
        state: Option<PathBuf>,
        /// Persist checkpoints to this file instead of emitting STATE messages
        #[arg(long = "state-output")]
        state_output: Option<PathBuf>,
    },
}

fn resolve_config(path: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    match path {
        Some(path) => Ok(path),
        None => Config::default_path().context("No --config given and no default config path"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // 1. RUST_LOG environment variable has highest precedence
    // 2. --log flag is used if RUST_LOG is not set
    // Logs go to stderr; stdout carries the message stream.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log.clone()));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Discover { config } => {
            let config_path = resolve_config(config)?;
            commands::discover::command(&config_path).await
        }
        Commands::Sync {
            config,
            catalog,
            state,
            state_output,
        } => {
            let config_path = resolve_config(config)?;
            commands::sync(commands::sync::SyncOptions {
                config_path,
                catalog_path: catalog,
                state_path: state,
                state_output,
            })
            .await?;
            tracing::info!("Completed successfully, exiting.");
            Ok(())
        }
    }
}
