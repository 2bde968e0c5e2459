//! Application state and sub-state extractors.
//!
//! AppState is split into a database sub-state so handlers and the worker
//! setup can extract only what they need via Axum's `FromRef`.

use dropkit_core::Config;
use dropkit_db::{DeletionOutboxRepository, UploadRepository};
use dropkit_storage::Storage;
use dropkit_worker::DeletionWorker;
use sqlx::PgPool;
use std::sync::Arc;

/// Database pool and repositories.
#[derive(Clone)]
pub struct DbState {
    pub pool: PgPool,
    pub uploads: UploadRepository,
    pub outbox: DeletionOutboxRepository,
}

/// Main application state: aggregates sub-states for dependency injection.
#[derive(Clone)]
pub struct AppState {
    pub db: DbState,
    pub storage: Arc<dyn Storage>,
    pub config: Config,
    pub is_production: bool,
    /// Keeps the in-process deletion worker alive for the lifetime of the
    /// state; `None` in router-only test setups.
    pub worker: Option<Arc<DeletionWorker>>,
}

impl axum::extract::FromRef<Arc<AppState>> for DbState {
    fn from_ref(state: &Arc<AppState>) -> Self {
        state.db.clone()
    }
}

fn _assert_app_state_send_sync() {
    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}
    assert_send::<AppState>();
    assert_sync::<AppState>();
}
