use rust_decimal::Decimal;

use crate::error::{OrderError, ValidationError};
use crate::ledger::models::Withdrawal;

// ========== OUTCOMES ==========

/// Result of `LoyaltyService::submit_order`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// New order recorded, reconciliation will pick it up
    Accepted,
    AlreadyOwnedBySelf,
    /// The number belongs to another user; ownership never changes
    Conflict(OrderError),
    /// Malformed number or failed checksum
    InvalidNumber(ValidationError),
}

/// Result of `LoyaltyService::withdraw`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WithdrawOutcome {
    Ok(Withdrawal),
    InsufficientFunds { required: Decimal, available: Decimal },
    /// Bad order number, non-positive amount or sub-cent digits
    Invalid(ValidationError),
}
