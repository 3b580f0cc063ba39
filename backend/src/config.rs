use serde::Deserialize;
use std::time::Duration;

use crate::error::{AppError, AppResult};

const DEFAULT_CONFIG_PATH: &str = "config/default";

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Config {
    pub database_uri: String,
    pub accrual_system_address: String,
    /// Scheduler tick
    pub poll_interval_ms: u64,
    /// Concurrent in-flight settlements
    pub worker_count: usize,
    /// Orders waiting for a free worker; overflow is deferred to the next tick
    pub queue_capacity: usize,
    pub accrual_timeout_secs: u64,
    pub rate_limit_fallback_secs: u64,
    /// Longest advertised Retry-After a worker will honour
    pub rate_limit_max_secs: u64,
    pub db_max_connections: u32,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_uri: "postgresql://localhost/gophermart".to_string(),
            accrual_system_address: "http://localhost:8082".to_string(),
            poll_interval_ms: 1000,
            worker_count: 10,
            queue_capacity: 10,
            accrual_timeout_secs: 10,
            rate_limit_fallback_secs: 60,
            rate_limit_max_secs: 600,
            db_max_connections: 20,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Defaults, then the file named by `CONFIG_PATH` (optional), then the
    /// environment (`DATABASE_URI`, `ACCRUAL_SYSTEM_ADDRESS`, ...).
    pub fn load() -> AppResult<Self> {
        let path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        let builder = Self::with_defaults()?
            .add_source(config::File::with_name(&path).required(false))
            .add_source(config::Environment::default().try_parsing(true));

        Self::from_builder(builder)
    }

    fn with_defaults() -> AppResult<config::ConfigBuilder<config::builder::DefaultState>> {
        let defaults = Self::default();

        Ok(config::Config::builder()
            .set_default("database_uri", defaults.database_uri)?
            .set_default("accrual_system_address", defaults.accrual_system_address)?
            .set_default("poll_interval_ms", defaults.poll_interval_ms)?
            .set_default("worker_count", defaults.worker_count as u64)?
            .set_default("queue_capacity", defaults.queue_capacity as u64)?
            .set_default("accrual_timeout_secs", defaults.accrual_timeout_secs)?
            .set_default("rate_limit_fallback_secs", defaults.rate_limit_fallback_secs)?
            .set_default("rate_limit_max_secs", defaults.rate_limit_max_secs)?
            .set_default("db_max_connections", defaults.db_max_connections as u64)?
            .set_default("log_level", defaults.log_level)?)
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> AppResult<Self> {
        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.worker_count == 0 {
            return Err(AppError::Config("worker_count must be at least 1".into()));
        }
        if self.queue_capacity == 0 {
            return Err(AppError::Config("queue_capacity must be at least 1".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(AppError::Config("poll_interval_ms must be at least 1".into()));
        }
        if self.rate_limit_max_secs < self.rate_limit_fallback_secs {
            return Err(AppError::Config(
                "rate_limit_max_secs must not be below rate_limit_fallback_secs".into(),
            ));
        }
        if self.accrual_system_address.trim().is_empty() {
            return Err(AppError::Config("accrual_system_address must be set".into()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn accrual_timeout(&self) -> Duration {
        Duration::from_secs(self.accrual_timeout_secs)
    }

    pub fn rate_limit_fallback(&self) -> Duration {
        Duration::from_secs(self.rate_limit_fallback_secs)
    }

    pub fn rate_limit_max(&self) -> Duration {
        Duration::from_secs(self.rate_limit_max_secs)
    }
}
