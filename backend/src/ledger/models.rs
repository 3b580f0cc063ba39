use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, Type};
use std::fmt;

/// Identifier of a user as issued by the registration layer
pub type UserId = i64;

/// Order status enum
///
/// NEW → PROCESSING → {PROCESSED | INVALID}, or NEW straight to a terminal
/// state. PROCESSED and INVALID accept no further transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "order_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    New,
    Processing,
    Processed,
    Invalid,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "NEW",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Processed => "PROCESSED",
            OrderStatus::Invalid => "INVALID",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Processed | OrderStatus::Invalid)
    }

    /// Whether the order may move from `self` to `to`.
    ///
    /// Terminal states are final and a non-terminal state never regresses.
    pub fn can_transition_to(&self, to: OrderStatus) -> bool {
        match (self, to) {
            (OrderStatus::Processed | OrderStatus::Invalid, _) => false,
            (OrderStatus::New, OrderStatus::Processing) => true,
            (OrderStatus::New | OrderStatus::Processing, OrderStatus::Processed) => true,
            (OrderStatus::New | OrderStatus::Processing, OrderStatus::Invalid) => true,
            _ => false,
        }
    }
}

/// Order entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub number: String,
    pub owner_id: UserId,
    pub status: OrderStatus,
    /// Set once, when the order becomes PROCESSED
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    pub accrual: Option<Decimal>,
    pub uploaded_at: DateTime<Utc>,
}

impl Order {
    pub fn new(number: impl Into<String>, owner_id: UserId) -> Self {
        Self {
            number: number.into(),
            owner_id,
            status: OrderStatus::New,
            accrual: None,
            uploaded_at: Utc::now(),
        }
    }

    pub fn is_reconciled(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Balance entity, one per user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Balance {
    #[serde(with = "rust_decimal::serde::float")]
    pub current: Decimal,

    #[serde(with = "rust_decimal::serde::float")]
    pub withdrawn: Decimal,
}

impl Balance {
    pub fn zero() -> Self {
        Self {
            current: Decimal::ZERO,
            withdrawn: Decimal::ZERO,
        }
    }

    pub fn has_available(&self, required: Decimal) -> bool {
        self.current >= required
    }
}

impl Default for Balance {
    fn default() -> Self {
        Self::zero()
    }
}

/// Append-only withdrawal ledger entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Withdrawal {
    #[serde(rename = "order")]
    pub order_number: String,

    #[serde(rename = "sum", with = "rust_decimal::serde::float")]
    pub amount: Decimal,

    pub processed_at: DateTime<Utc>,
}

/// Result of claiming an order number for a user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    Created,
    AlreadyOwnedBySelf,
    AlreadyOwnedByOther,
}

/// Result of applying an accrual result to an order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    /// Status written; `credited` is the amount added to the owner's balance
    Applied { credited: Decimal },
    /// Order was already terminal, nothing written
    AlreadyTerminal,
    /// Transition would not move the order forward, nothing written
    Unchanged,
}

/// Result of debiting a balance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebitOutcome {
    Ok(Withdrawal),
    InsufficientFunds { available: Decimal },
}
