use async_trait::async_trait;
use rust_decimal::Decimal;

use super::models::*;
use crate::error::AppResult;

/// Ledger store trait - the transactional persistence boundary
///
/// Implemented by the Postgres `LedgerRepository` and by the in-memory
/// `MemoryLedger`.
///
/// INVARIANTS:
/// - `claim_order`, `settle` and `debit` are each one atomic unit that locks
///   exactly the rows it touches
/// - an order is credited at most once, when it first becomes PROCESSED
/// - `current` never goes negative
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Create the zero-valued balance for a newly registered user.
    /// Idempotent.
    async fn open_account(&self, user_id: UserId) -> AppResult<()>;

    /// Insert a NEW order for `owner`, or report who already owns it.
    async fn claim_order(&self, number: &str, owner: UserId) -> AppResult<ClaimOutcome>;

    /// Snapshot of every order not yet in a terminal status.
    async fn list_unreconciled(&self) -> AppResult<Vec<Order>>;

    /// Apply an accrual result to an order.
    ///
    /// A no-op returning `AlreadyTerminal` when the order is already
    /// PROCESSED or INVALID. When `status` is PROCESSED the owner's balance
    /// is credited by `accrual` in the same transaction. A negative `accrual`
    /// is rejected with `ValidationError::NegativeAccrual` before anything
    /// is read.
    async fn settle(
        &self,
        number: &str,
        status: OrderStatus,
        accrual: Decimal,
    ) -> AppResult<SettleOutcome>;

    /// Debit `amount` from `user_id` and append a withdrawal record.
    async fn debit(
        &self,
        user_id: UserId,
        amount: Decimal,
        order_reference: &str,
    ) -> AppResult<DebitOutcome>;

    /// Orders of one user, newest first.
    async fn orders_for(&self, owner: UserId) -> AppResult<Vec<Order>>;

    /// Current balance; zero if the account has no balance row yet.
    async fn balance(&self, user_id: UserId) -> AppResult<Balance>;

    /// Withdrawal history of one user, newest first.
    async fn withdrawals_for(&self, user_id: UserId) -> AppResult<Vec<Withdrawal>>;
}
