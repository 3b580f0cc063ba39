use sqlx::{postgres::PgPoolOptions, PgPool};
use std::{sync::Arc, time::Duration};
use tracing::info;

use crate::{
    accrual::HttpAccrualClient,
    api::LoyaltyService,
    config::Config,
    error::AppResult,
    ledger::{LedgerRepository, LedgerStore},
    settlement::{ReconciliationScheduleConfig, ReconciliationScheduler},
};

/// Everything the process needs once wired up
pub struct AppState {
    pub ledger: Arc<dyn LedgerStore>,
    pub service: Arc<LoyaltyService>,
    /// Not started yet; see `ReconciliationScheduler::start`
    pub scheduler: ReconciliationScheduler,
}

pub async fn initialize_app_state(config: &Config) -> AppResult<AppState> {
    info!("Initializing application components ...");

    // Database pool
    let pool = initialize_database(config).await?;

    // Core components
    let ledger: Arc<dyn LedgerStore> = Arc::new(LedgerRepository::new(pool));

    let accrual = Arc::new(HttpAccrualClient::new(
        &config.accrual_system_address,
        config.accrual_timeout(),
        config.rate_limit_fallback(),
        config.rate_limit_max(),
    )?);
    info!("✅ Accrual client initialized for {}", config.accrual_system_address);

    let service = Arc::new(LoyaltyService::new(ledger.clone()));

    let scheduler = ReconciliationScheduler::new(
        ReconciliationScheduleConfig::from(config),
        ledger.clone(),
        accrual,
    );

    Ok(AppState {
        ledger,
        service,
        scheduler,
    })
}

pub async fn initialize_database(config: &Config) -> AppResult<PgPool> {
    info!("📊 Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(&config.database_uri)
        .await?;

    info!(
        "✓ Database pool configured: {} max connections",
        config.db_max_connections
    );

    // Run migrations
    info!("🔄 Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;

    info!("✓ Database initialized");
    Ok(pool)
}
