// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Preserva Core - Deposit Job Engine
//!
//! Runs the standard deposit pipeline for one deposit:
//! - Validation (destination, content model, file availability)
//! - Fixity check
//! - Virus scan (clamd)
//! - Technical metadata extraction (FITS)
//!
//! The deposit to process is named by `PRESERVA_DEPOSIT_ID`. A paused or
//! crashed run is resumed by invoking the binary again with the same id.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};

use preserva_core::config::Config;
use preserva_core::pipeline::DepositPipeline;
use preserva_core::registry::SqliteStatusStore;
use preserva_core::services::{ClamdScanner, FitsHttpClient};
use preserva_model::pid::Pid;
use preserva_model::store::GraphStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("preserva_core=info".parse().unwrap()),
        )
        .init();

    info!("Starting Preserva Core");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;

    let deposit_id = std::env::var("PRESERVA_DEPOSIT_ID")
        .context("PRESERVA_DEPOSIT_ID must name the deposit to process")?;
    let deposit_id = Pid::parse(&deposit_id).context("PRESERVA_DEPOSIT_ID is not a valid pid")?;

    info!(
        deposit_id = %deposit_id,
        deposits_dir = %config.deposits_dir.display(),
        fits_url = %config.fits_url,
        clamd_addr = %config.clamd_addr,
        workers = config.workers,
        "Configuration loaded"
    );

    // Connect the status registries and run migrations
    let store = Arc::new(SqliteStatusStore::from_url(&config.database_url).await?);
    info!("Status registry initialized");

    let graphs = Arc::new(GraphStore::new(&config.deposits_dir)?);
    let characterization = Arc::new(FitsHttpClient::new(
        config.fits_url.clone(),
        config.external_timeout,
    ));
    let scanner = Arc::new(ClamdScanner::new(
        config.clamd_addr.clone(),
        config.external_timeout,
    ));

    let pipeline = DepositPipeline::standard(
        graphs,
        store.clone(),
        store,
        config.job_options(),
        characterization,
        scanner,
        config.clamd_local,
    );

    match pipeline.run(&deposit_id).await {
        Ok(()) => {
            info!(deposit_id = %deposit_id, "Deposit finished");
            Ok(())
        }
        Err(e) if e.is_resumable() => {
            info!(deposit_id = %deposit_id, error = %e, "Deposit parked; rerun to resume");
            Ok(())
        }
        Err(e) => {
            error!(deposit_id = %deposit_id, error = %e, "Deposit failed");
            Err(e.into())
        }
    }
}
