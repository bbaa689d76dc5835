//! auth-service entry point.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────┐
//!                     │                 AUTH SERVICE                 │
//!                     │                                              │
//!   HTTP clients ─────┼─▶ net listener ─▶ http server ─▶ routes     │
//!                     │        ▲                                     │
//!                     │        │ close / drain                       │
//!                     │  ┌─────┴──────────┐      ┌────────────────┐   │
//!   SIGINT/SIGTERM ───┼─▶│  orchestrator  │─────▶│ message broker │◀──┼── NATS (ws://)
//!                     │  └─────┬──────────┘ close└────────────────┘   │
//!                     │        │ outcome                             │
//!                     │        ▼                                     │
//!                     │   store close ─▶ exit status                 │
//!                     └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use auth_service::config::{load_settings, EnvSource, ObservabilityConfig};
use auth_service::lifecycle::startup;
use auth_service::observability::logging::init_logging;

#[derive(Parser, Debug)]
#[command(name = "auth-service")]
#[command(about = "Auth service: HTTP listener and message subscriber with bounded shutdown")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "SERVICE_CONFIG", help = "Path to TOML configuration file")]
    config: Option<PathBuf>,

    /// Validate configuration and exit
    #[arg(long, help = "Load and validate configuration, print it and exit")]
    check_config: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match load_settings(cli.config.as_deref(), &EnvSource) {
        Ok(settings) => settings,
        Err(e) => {
            init_logging(&ObservabilityConfig::default());
            tracing::error!(error = %e, "Failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    if cli.check_config {
        println!("{:#?}", settings);
        return ExitCode::SUCCESS;
    }

    init_logging(&settings.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "auth-service starting");

    let deps = match startup::build_dependencies(&settings).await {
        Ok(deps) => deps,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            return ExitCode::FAILURE;
        }
    };

    match startup::run(deps).await {
        Ok(outcome) => ExitCode::from(outcome.exit_code()),
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            ExitCode::FAILURE
        }
    }
}
