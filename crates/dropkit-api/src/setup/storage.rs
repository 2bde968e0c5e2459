//! Storage setup and initialization

use anyhow::Result;
use dropkit_core::Config;
use dropkit_storage::{create_storage, Storage};
use std::sync::Arc;

/// Build the configured storage backend. This factory call is the only place
/// the backend tag is examined; every caller downstream sees `dyn Storage`.
pub async fn setup_storage(config: &Config) -> Result<Arc<dyn Storage>> {
    tracing::info!("Initializing storage abstraction...");
    let storage = create_storage(config).await?;

    // One-time reachability probe. Best-effort: a transient failure is
    // logged, not fatal, and surfaces again on the first real operation.
    if let Err(e) = storage.exists(".dropkit-probe").await {
        tracing::warn!(error = %e, "Storage reachability probe failed");
    }

    tracing::info!(
        backend = %storage.backend_type(),
        "Storage abstraction initialized successfully"
    );

    Ok(storage)
}
