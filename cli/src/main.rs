// Copyright (c) 2026 gemward contributors
// SPDX-License-Identifier: AGPL-3.0

//! # gemward
//!
//! Control plane for a private gem registry. Sits in front of the artifact
//! server and answers one question per request: may this caller do this,
//! and is the gem safe to hand out?
//!
//! ## Commands
//!
//! - `gemward serve` (default) - run the HTTP control plane
//! - `gemward config show|validate` - inspect the effective configuration

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

mod commands;
mod server;

use commands::ConfigCommand;

/// gemward - identity and vulnerability admission for private gems
#[derive(Parser)]
#[command(name = "gemward")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "GEMWARD_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "GEMWARD_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, global = true, env = "GEMWARD_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the control plane
    #[command(name = "serve")]
    Serve,

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is the normal case
    let dotenv = dotenvy::dotenv();

    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_format)?;

    if let Ok(path) = dotenv {
        info!(path = %path.display(), "Loaded environment file");
    }

    match cli.command {
        None | Some(Commands::Serve) => server::run(cli.config).await,
        Some(Commands::Config { command }) => commands::config::handle_command(command, cli.config).await,
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match format {
        LogFormat::Text => builder.compact().init(),
        LogFormat::Json => builder.json().init(),
    }

    Ok(())
}
