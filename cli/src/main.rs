// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Kestrel Threat Hunter CLI
//!
//! The `kestrel` binary drives one investigation from the command line:
//! it loads a HuntConfig manifest, wires the reasoning engine and intel
//! client into the investigation service, runs the indicator to a terminal
//! state and prints the synthesis report (or the full state snapshot).
//!
//! ## Commands
//!
//! - `kestrel investigate <ioc>` - Run an investigation against an indicator
//! - `kestrel config validate` - Validate the configuration manifest

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use kestrel_core::domain::config::HuntConfigManifest;
use kestrel_core::application::investigation_service::InvestigationService;
use kestrel_core::infrastructure::event_bus::EventBus;
use kestrel_core::infrastructure::intel::client::IntelClient;
use kestrel_core::infrastructure::llm::registry::{build_engine, resolve_api_key};

/// Kestrel - autonomous threat-intelligence investigations
#[derive(Parser)]
#[command(name = "kestrel")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "KESTREL_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "KESTREL_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one investigation against an indicator (hash, IP, domain or URL)
    Investigate {
        /// The indicator to investigate
        ioc: String,

        /// Print the full state snapshot as JSON instead of the report
        #[arg(long)]
        json: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Parse and validate the configuration manifest
    Validate,
}

fn init_tracing(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config(path: Option<PathBuf>) -> Result<HuntConfigManifest> {
    let path = path.unwrap_or_else(|| PathBuf::from("kestrel.yaml"));
    let yaml = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let manifest = HuntConfigManifest::from_yaml(&yaml).context("Failed to parse config manifest")?;
    manifest
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid config manifest: {}", e))?;
    Ok(manifest)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match cli.command {
        Commands::Config { command } => match command {
            ConfigCommand::Validate => {
                let manifest = load_config(cli.config)?;
                println!("Config OK: node '{}'", manifest.metadata.name);
                Ok(())
            }
        },
        Commands::Investigate { ioc, json } => {
            let manifest = load_config(cli.config)?;
            info!(node = %manifest.metadata.name, "configuration loaded");

            let engine = build_engine(&manifest.spec.llm)?;
            let intel_key = resolve_api_key(&manifest.spec.intel.api_key)?;
            let intel = Arc::new(IntelClient::new(manifest.spec.intel.endpoint.clone(), intel_key));

            let service = InvestigationService::new(
                engine,
                intel,
                EventBus::with_default_capacity(),
                manifest.spec.budget.clone(),
                manifest.spec.hunt.clone(),
            );

            let snapshot = service.run_investigation(&ioc).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                if let Some(report) = &snapshot.report {
                    println!("{}", report);
                }
                let open_leads: Vec<&str> =
                    snapshot.unanalyzed().map(|n| n.id.as_str()).collect();
                eprintln!(
                    "\n{} entities, {} relationships, {} iteration(s); {} open lead(s){}",
                    snapshot.nodes.len(),
                    snapshot.edges.len(),
                    snapshot.iteration,
                    open_leads.len(),
                    snapshot
                        .stop_reason
                        .as_ref()
                        .map(|r| format!("; stopped: {}", r))
                        .unwrap_or_default()
                );
            }
            Ok(())
        }
    }
}
