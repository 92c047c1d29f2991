//! Authenticating API gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌──────────────────────────────────────────────┐
//!                         │                  GATEWAY                     │
//!   Client request        │  ┌────────┐   ┌────────┐   ┌─────────────┐   │
//!   ──────────────────────┼─▶│  http  │──▶│  auth  │──▶│   routing   │   │
//!                         │  │ server │   │ token  │   │ RouteTable  │   │
//!                         │  └────────┘   └────────┘   └──────┬──────┘   │
//!                         │                    http routes    │  ws routes
//!                         │                  ┌────────────────┴───────┐  │
//!                         │                  ▼                        ▼  │
//!                         │          ┌──────────────┐      ┌──────────┐  │
//!   Client response       │          │  dispatcher  │      │  tunnel  │  │
//!   ◀─────────────────────┼──────────│ (hyper-util) │      │ (relay)  │◀─┼──▶ Backend
//!                         │          └──────────────┘      └──────────┘  │
//!                         │  config · observability · lifecycle          │
//!                         └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use api_gateway::config::load_config;
use api_gateway::lifecycle::startup;
use api_gateway::observability::logging;

#[derive(Parser, Debug)]
#[command(name = "api-gateway", version, about = "Authenticating API gateway")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "GATEWAY_CONFIG", default_value = "gateway.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = load_config(&cli.config)?;
    logging::init(&config.observability)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.timeouts.request_secs,
        "api-gateway starting"
    );

    startup::run(config).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
