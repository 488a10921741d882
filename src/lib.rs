pub mod db;
pub mod errors;
pub mod format;
pub mod models;
pub mod rollup;
pub mod store;
pub mod tracker;

use crate::db::Database;
use crate::errors::AppResult;
use crate::models::AppSettings;
use crate::store::{CollectionBackend, LatencyProfile, Ledger, LedgerStore, SimulatedLatency};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

pub const DATABASE_FILE: &str = "ledger.db";

/// Everything a client session needs: the database handle, the store built on it and
/// the settings it was built with.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub store: Arc<dyn LedgerStore>,
    pub settings: AppSettings,
}

impl AppState {
    pub fn open(data_dir: &Path) -> AppResult<Self> {
        let db = Arc::new(Database::new(&data_dir.join(DATABASE_FILE))?);
        let settings = db.get_settings()?;
        let store = ledger_store(Arc::clone(&db), &settings);

        tracing::info!(path = %db.path().display(), "ledger store opened");
        Ok(Self { db, store, settings })
    }
}

/// Builds the store a session talks to: a `Ledger` over `backend` configured from `settings`,
/// wrapped in `SimulatedLatency` when any delay is set.
pub fn ledger_store<B: CollectionBackend>(backend: Arc<B>, settings: &AppSettings) -> Arc<dyn LedgerStore> {
    let ledger = Ledger::new(backend).with_optimistic_concurrency(settings.optimistic_concurrency);

    let profile = LatencyProfile::from_settings(settings);
    if profile.is_zero() {
        Arc::new(ledger)
    } else {
        tracing::info!(?profile, "simulated store latency enabled");
        Arc::new(SimulatedLatency::new(ledger, profile))
    }
}

pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("growth-ledger")
}

pub fn init_tracing(data_dir: &Path) -> Result<(), String> {
    let log_dir = data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).map_err(|error| error.to_string())?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "ledger.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| error.to_string())
}
