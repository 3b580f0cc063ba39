use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::models::{SubmitOutcome, WithdrawOutcome};
use crate::error::{AppError, AppResult, BalanceError, OrderError};
use crate::ledger::models::*;
use crate::ledger::LedgerStore;
use crate::order_number;
use crate::withdrawal::WithdrawalProcessor;

/// Entry point for the transport layer.
///
/// Callers are already authenticated; `owner` is trusted. Expected business
/// outcomes come back as `SubmitOutcome`/`WithdrawOutcome`, only storage and
/// internal failures are `Err`.
pub struct LoyaltyService {
    ledger: Arc<dyn LedgerStore>,
    withdrawals: WithdrawalProcessor,
}

impl LoyaltyService {
    pub fn new(ledger: Arc<dyn LedgerStore>) -> Self {
        Self {
            withdrawals: WithdrawalProcessor::new(ledger.clone()),
            ledger,
        }
    }

    /// Create the zero balance of a freshly registered user.
    pub async fn open_account(&self, owner: UserId) -> AppResult<()> {
        self.ledger.open_account(owner).await
    }

    #[instrument(skip(self))]
    pub async fn submit_order(&self, owner: UserId, number: &str) -> AppResult<SubmitOutcome> {
        let number = number.trim();
        if let Err(e) = order_number::validate(number) {
            warn!("Rejected order submission from {}: {}", owner, e);
            return Ok(SubmitOutcome::InvalidNumber(e));
        }

        let outcome = match self.ledger.claim_order(number, owner).await? {
            ClaimOutcome::Created => {
                info!("📥 Order {} accepted for user {}", number, owner);
                SubmitOutcome::Accepted
            }
            ClaimOutcome::AlreadyOwnedBySelf => SubmitOutcome::AlreadyOwnedBySelf,
            ClaimOutcome::AlreadyOwnedByOther => {
                warn!("Order {} already belongs to another user", number);
                SubmitOutcome::Conflict(OrderError::AlreadyOwnedByOther(number.to_string()))
            }
        };

        Ok(outcome)
    }

    /// Orders of `owner`, newest first. Empty when none were submitted.
    pub async fn list_orders(&self, owner: UserId) -> AppResult<Vec<Order>> {
        self.ledger.orders_for(owner).await
    }

    pub async fn get_balance(&self, owner: UserId) -> AppResult<Balance> {
        self.ledger.balance(owner).await
    }

    pub async fn withdraw(
        &self,
        owner: UserId,
        number: &str,
        amount: Decimal,
    ) -> AppResult<WithdrawOutcome> {
        match self.withdrawals.withdraw(owner, number.trim(), amount).await {
            Ok(withdrawal) => Ok(WithdrawOutcome::Ok(withdrawal)),
            Err(AppError::Validation(e)) => Ok(WithdrawOutcome::Invalid(e)),
            Err(AppError::Balance(BalanceError::InsufficientFunds {
                required,
                available,
            })) => Ok(WithdrawOutcome::InsufficientFunds {
                required,
                available,
            }),
            Err(e) => Err(e),
        }
    }

    /// Withdrawal history of `owner`, newest first.
    pub async fn list_withdrawals(&self, owner: UserId) -> AppResult<Vec<Withdrawal>> {
        self.ledger.withdrawals_for(owner).await
    }
}
