//! Application state wiring all services together.
//!
//! AppState holds the concrete service instances used by both CLI and REST
//! API. The controller and coordinator are generic over the store, wallet,
//! and rate-card ports; AppState pins them to the SQLite implementations.

use std::path::PathBuf;
use std::sync::Arc;

use counsel_core::billing::BillingEngine;
use counsel_core::event::EventBus;
use counsel_core::notify::NotificationCoordinator;
use counsel_core::session::LifecycleController;
use counsel_infra::sqlite::pool::DatabasePool;
use counsel_infra::sqlite::{SqliteRateCard, SqliteSessionStore, SqliteWallet};
use counsel_types::config::GlobalConfig;

/// Concrete type aliases for the service generics pinned to infra implementations.
pub type ConcreteController =
    LifecycleController<SqliteSessionStore, SqliteWallet, SqliteRateCard>;

pub type ConcreteCoordinator =
    NotificationCoordinator<SqliteSessionStore, SqliteWallet, SqliteRateCard>;

/// Shared application state holding all services.
///
/// Used by both CLI commands and REST API handlers.
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<ConcreteController>,
    pub coordinator: Arc<ConcreteCoordinator>,
    pub wallet: Arc<SqliteWallet>,
    pub rates: Arc<SqliteRateCard>,
    pub event_bus: EventBus,
    pub config: GlobalConfig,
    pub data_dir: PathBuf,
    pub db_pool: DatabasePool,
}

impl AppState {
    /// Initialize the application state: load config, connect to the
    /// database, wire services.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        tokio::fs::create_dir_all(&data_dir).await?;

        let config = load_config(&data_dir).await?;

        let db_url = std::env::var("COUNSEL_DATABASE_URL").unwrap_or_else(|_| {
            format!("sqlite://{}?mode=rwc", data_dir.join("counsel.db").display())
        });
        let db_pool = DatabasePool::new(&db_url).await?;

        let wallet = Arc::new(SqliteWallet::new(db_pool.clone()));
        let store = Arc::new(SqliteSessionStore::new(db_pool.clone()));
        let rates = Arc::new(SqliteRateCard::new(db_pool.clone()));

        let event_bus = EventBus::new(config.event_capacity);

        let engine = Arc::new(BillingEngine::new(
            Arc::clone(&wallet),
            event_bus.clone(),
            config.billing.clone(),
        ));

        let controller = Arc::new(LifecycleController::new(
            store,
            Arc::clone(&wallet),
            Arc::clone(&rates),
            engine,
            event_bus.clone(),
            config.billing.clone(),
        ));

        let coordinator = Arc::new(NotificationCoordinator::new(
            Arc::clone(&controller),
            Arc::clone(&wallet),
            event_bus.clone(),
            config.notify.clone(),
        ));

        Ok(Self {
            controller,
            coordinator,
            wallet,
            rates,
            event_bus,
            config,
            data_dir,
            db_pool,
        })
    }
}

/// Resolve the data directory from `COUNSEL_DATA_DIR`, falling back to
/// `~/.counsel`.
fn resolve_data_dir() -> PathBuf {
    match std::env::var("COUNSEL_DATA_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(_) => {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".counsel")
        }
    }
}

/// Load `config.toml` from the data directory, falling back to defaults
/// when the file does not exist.
async fn load_config(data_dir: &std::path::Path) -> anyhow::Result<GlobalConfig> {
    let path = data_dir.join("config.toml");
    match tokio::fs::read_to_string(&path).await {
        Ok(contents) => {
            let config = toml::from_str(&contents)
                .map_err(|e| anyhow::anyhow!("invalid config at {}: {e}", path.display()))?;
            tracing::debug!(path = %path.display(), "loaded configuration");
            Ok(config)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(GlobalConfig::default()),
        Err(e) => Err(anyhow::anyhow!("failed to read {}: {e}", path.display())),
    }
}
