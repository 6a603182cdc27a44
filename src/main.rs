// src/main.rs
use anyhow::Result;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

use tcp_load_balancer::{
    config::{self, ConfigError},
    server::{shutdown_signal, ServerBuilder, ShutdownOutcome},
};

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = init_tracing() {
        eprintln!("Failed to initialise logging: {e}");
        return ExitCode::FAILURE;
    }

    match run().await {
        Ok(ShutdownOutcome::Drained) => ExitCode::SUCCESS,
        Ok(ShutdownOutcome::Forced { .. }) => ExitCode::FAILURE,
        Err(e) => {
            error!("Fatal: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tcp_load_balancer=info".parse()?),
        )
        .init();
    Ok(())
}

async fn run() -> Result<ShutdownOutcome> {
    // Optional config file; everything else comes from the environment.
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    if let Some(path) = &config_path {
        info!("Loading configuration from: {}", path.display());
    }

    let config = match config::load_config(config_path.as_deref()).await {
        Ok(config) => config,
        Err(ConfigError::Invalid(issues)) => {
            error!("Configuration validation failed:");
            for issue in &issues {
                error!("  - {}", issue);
            }
            anyhow::bail!("{} configuration issue(s)", issues.len());
        }
        Err(e) => return Err(e.into()),
    };

    info!(
        proxy_port = config.proxy_port,
        backends = config.backends.len(),
        health_interval_ms = config.health_check.interval_ms,
        health_timeout_ms = config.health_check.timeout_ms,
        shutdown_timeout_ms = config.shutdown.timeout_ms,
        "Configuration loaded"
    );

    let server = ServerBuilder::new(config).start().await?;
    let outcome = server.serve(shutdown_signal()).await;

    match outcome {
        ShutdownOutcome::Drained => info!("Shutdown complete"),
        ShutdownOutcome::Forced { remaining } => {
            error!(remaining, "Shutdown forced after timeout")
        }
    }
    Ok(outcome)
}
