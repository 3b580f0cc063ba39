use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::ledger::models::OrderStatus;

/// Order status as reported by the accrual service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccrualStatus {
    /// Known to the service, calculation not started
    Registered,
    Processing,
    Invalid,
    Processed,
}

/// Response body of `GET /api/orders/{number}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccrualResponse {
    pub order: String,
    pub status: AccrualStatus,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    pub accrual: Option<Decimal>,
}

/// Typed result of one accrual query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccrualOutcome {
    /// A status the ledger should record
    Settled { status: OrderStatus, accrual: Decimal },
    /// Registered but not yet picked up by the service
    Pending,
    /// HTTP 429; do not query again before `retry_after`
    RateLimited { retry_after: Duration },
    /// The service does not know this order
    NotFound,
    /// Network failure, 5xx, or an unreadable response
    Transient(String),
}

impl AccrualResponse {
    pub fn into_outcome(self) -> AccrualOutcome {
        let status = match self.status {
            AccrualStatus::Registered => return AccrualOutcome::Pending,
            AccrualStatus::Processing => OrderStatus::Processing,
            AccrualStatus::Invalid => OrderStatus::Invalid,
            AccrualStatus::Processed => OrderStatus::Processed,
        };

        let accrual = match (status, self.accrual) {
            // A zero reward is sent without the field
            (OrderStatus::Processed, None) => Decimal::ZERO,
            (OrderStatus::Processed, Some(amount)) if amount < Decimal::ZERO => {
                return AccrualOutcome::Transient(format!("negative accrual {}", amount));
            }
            (OrderStatus::Processed, Some(amount)) => amount.round_dp(2),
            _ => Decimal::ZERO,
        };

        AccrualOutcome::Settled { status, accrual }
    }
}
