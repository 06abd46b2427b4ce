// Copyright (c) 2026 gemward contributors
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use gemward_core::domain::config::{AuthType, GatewayConfig};

const REDACTED: &str = "<redacted>";

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration with secrets redacted
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path
        #[arg(short, long, default_value = "./gemward.yaml")]
        output: PathBuf,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths),
        ConfigCommand::Validate { file } => validate(file.or(config_override)),
        ConfigCommand::Generate { output } => generate(output),
    }
}

fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = GatewayConfig::load_or_default(config_override.clone()).context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        match &config_override {
            Some(path) => println!("  1. --config flag: {}", path.display()),
            None => println!("  1. --config flag: {}", "(not set)".dimmed()),
        }
        println!(
            "  2. GEMWARD_CONFIG_PATH: {}",
            std::env::var("GEMWARD_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./gemward.yaml");
        println!("  4. /etc/gemward/gemward.yaml");
        println!();
    }

    println!("{}", "Effective configuration:".bold());
    println!();
    let rendered = serde_yaml::to_string(&redact(config)).context("Failed to render configuration")?;
    print!("{rendered}");

    Ok(())
}

fn redact(mut config: GatewayConfig) -> GatewayConfig {
    let auth = &mut config.auth;
    if auth.session_secret.is_some() {
        auth.session_secret = Some(REDACTED.to_string());
    }
    auth.previous_session_secrets.iter_mut().for_each(|s| *s = REDACTED.to_string());
    if auth.admin_password.is_some() {
        auth.admin_password = Some(REDACTED.to_string());
    }
    for pair in auth.local_users.iter_mut() {
        let user = pair.split_once(':').map_or(pair.as_str(), |(u, _)| u).to_string();
        *pair = format!("{user}:{REDACTED}");
    }
    if !auth.github.client_secret.is_empty() {
        auth.github.client_secret = REDACTED.to_string();
    }
    config
}

fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = GatewayConfig::load_or_default(config_path).context("Failed to load configuration")?;

    config.validate().context("Configuration validation failed")?;

    if config.auth.auth_type != AuthType::None {
        config.policy.resolve_model().context("Policy model not found")?;
        config.policy.resolve_table().context("Policy table not found")?;
    }

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

fn generate(output: PathBuf) -> Result<()> {
    let sample = include_str!("../../../config/gemward.yaml");

    std::fs::write(&output, sample).with_context(|| format!("Failed to write config to {:?}", output))?;

    println!("{}", format!("✓ Configuration generated: {}", output.display()).green());

    Ok(())
}
