// Copyright 2025
// Licensed under the Elastic License v2.0

#![warn(clippy::all)]

use anyhow::{Context, Result};
use dotenvy::dotenv;
use tracing::{error, info};

use pisa_sync::{Config, SyncEngine};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    config.print_banner();
    let engine = SyncEngine::from_config(&config)?;

    if config.run_once {
        return match engine.run_once().await? {
            Some(report) => {
                let json = serde_json::to_string_pretty(&report)
                    .context("failed to serialize pass report")?;
                println!("{}", json);
                Ok(())
            }
            None => Ok(()),
        };
    }

    let state = engine.shared_state();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, finishing the current pass before exit");
                state.request_shutdown();
            }
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    engine.run_forever(config.interval).await;
    info!("pisa-sync stopped");
    Ok(())
}
