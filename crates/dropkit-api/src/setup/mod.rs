//! Application setup and initialization
//!
//! All application initialization logic lives here rather than in main.rs,
//! for better organization and testability.

pub mod database;
pub mod routes;
pub mod server;
pub mod storage;

use crate::state::{AppState, DbState};
use anyhow::{Context, Result};
use dropkit_core::Config;
use dropkit_db::{DeletionOutboxRepository, UploadRepository};
use dropkit_worker::{DeletionWorker, DeletionWorkerConfig};
use std::sync::Arc;

/// Initialize the entire application
pub async fn initialize_app(config: Config) -> Result<(Arc<AppState>, axum::Router)> {
    // Validate configuration first - fail fast on misconfiguration
    config
        .validate()
        .context("Configuration validation failed")?;

    tracing::info!("Configuration loaded and validated successfully");

    // Setup database
    let pool = database::setup_database(&config).await?;

    // Setup storage
    let storage = storage::setup_storage(&config).await?;

    let uploads = UploadRepository::new(pool.clone());
    let outbox = DeletionOutboxRepository::new(pool.clone());

    // The deletion worker rides in-process here; it coordinates exclusively
    // through the durable outbox, so it could equally run as its own process.
    let worker = DeletionWorker::spawn(
        pool.clone(),
        uploads.clone(),
        outbox.clone(),
        storage.clone(),
        DeletionWorkerConfig {
            poll_interval_ms: config.worker_poll_interval_ms,
            max_delete_attempts: config.worker_max_delete_attempts,
            expired_retention_hours: config.expired_retention_hours,
        },
    );

    let is_production = config.is_production();
    let state = Arc::new(AppState {
        db: DbState {
            pool,
            uploads,
            outbox,
        },
        storage,
        config: config.clone(),
        is_production,
        worker: Some(Arc::new(worker)),
    });

    // Setup routes
    let router = routes::setup_routes(&config, state.clone())?;

    Ok((state, router))
}
