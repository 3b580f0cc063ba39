use rust_decimal::Decimal;
use sqlx::migrate::MigrateError;
use thiserror::Error;

/// Top-level error type for the entire application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] MigrateError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    #[error("Balance error: {0}")]
    Balance(#[from] BalanceError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Order number and amount validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Order number is empty")]
    EmptyInput,

    #[error("Order number contains non-digit characters: {0}")]
    MalformedInput(String),

    #[error("Order number failed checksum: {0}")]
    InvalidChecksum(String),

    #[error("Amount must be positive, got {0}")]
    NonPositiveAmount(Decimal),

    #[error("Amount has more than two decimal places: {0}")]
    ExcessivePrecision(Decimal),

    #[error("Accrual must not be negative, got {0}")]
    NegativeAccrual(Decimal),
}

/// Order ownership and lookup errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderError {
    #[error("Order {0} already uploaded by another user")]
    AlreadyOwnedByOther(String),

    #[error("Order not found: {0}")]
    NotFound(String),
}

/// Balance errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BalanceError {
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: Decimal, available: Decimal },
}

/// Error classes the collaborator maps to client-visible behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Rejected immediately, never retried
    Validation,
    /// Permanent ownership conflict
    Conflict,
    /// Self-healing; retried by the next scheduler tick
    Transient,
    /// Not enough balance
    Resource,
    /// Transaction failure in the backing store
    Storage,
    Internal,
}

impl AppError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            AppError::Validation(_) => ErrorCategory::Validation,
            AppError::Order(OrderError::AlreadyOwnedByOther(_)) => ErrorCategory::Conflict,
            AppError::Order(OrderError::NotFound(_)) => ErrorCategory::Validation,
            AppError::Balance(_) => ErrorCategory::Resource,
            AppError::Database(sqlx::Error::PoolTimedOut)
            | AppError::Database(sqlx::Error::Io(_)) => ErrorCategory::Transient,
            AppError::Database(_) | AppError::Migration(_) => ErrorCategory::Storage,
            AppError::Config(_) | AppError::Internal(_) => ErrorCategory::Internal,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(ValidationError::EmptyInput)
            | AppError::Validation(ValidationError::MalformedInput(_)) => "MALFORMED_ORDER_NUMBER",
            AppError::Validation(ValidationError::InvalidChecksum(_)) => "INVALID_CHECKSUM",
            AppError::Validation(ValidationError::NonPositiveAmount(_))
            | AppError::Validation(ValidationError::ExcessivePrecision(_))
            | AppError::Validation(ValidationError::NegativeAccrual(_)) => "INVALID_AMOUNT",
            AppError::Order(OrderError::AlreadyOwnedByOther(_)) => "ORDER_CONFLICT",
            AppError::Order(OrderError::NotFound(_)) => "ORDER_NOT_FOUND",
            AppError::Balance(BalanceError::InsufficientFunds { .. }) => "INSUFFICIENT_FUNDS",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Migration(_) => "MIGRATION_ERROR",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the failed operation may simply be tried again later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Transient | ErrorCategory::Storage
        )
    }
}

impl From<config::ConfigError> for AppError {
    fn from(error: config::ConfigError) -> Self {
        AppError::Config(error.to_string())
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(error: tokio::task::JoinError) -> Self {
        AppError::Internal(format!("Task join error: {:?}", error))
    }
}

/// Result type alias for the application
pub type AppResult<T> = Result<T, AppError>;
