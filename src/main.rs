//! tcps: a minimal loopback TCP server
//!
//! Accepts clients on `127.0.0.1:<port>` and gives each one its own task.
//! Every client is greeted once and then gets the same fixed reply to
//! every message it sends, until it disconnects.

mod config;
mod error;
mod listener;
mod session;

use config::{Config, Invocation, USAGE};
use listener::{Endpoint, Listener};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::load() {
        Ok(Invocation::Serve(config)) => config,
        Ok(Invocation::Usage) => {
            print!("{USAGE}");
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            init_logging("info");
            error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    init_logging(&config.log_level);

    info!(port = config.port, "Starting tcps server");

    match serve(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Server failed");
            ExitCode::FAILURE
        }
    }
}

/// Bind the endpoint and accept clients until interrupted.
async fn serve(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let endpoint = Endpoint::bind(config.port)?;
    info!(address = %endpoint.local_addr(), "Accepting clients");

    Listener::new(endpoint)
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Unable to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    Ok(())
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
