// Withdrawal Processor - spends loyalty points against a new order number

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::error::{AppResult, BalanceError, ValidationError};
use crate::ledger::models::{DebitOutcome, UserId, Withdrawal};
use crate::ledger::LedgerStore;
use crate::order_number;

pub struct WithdrawalProcessor {
    ledger: Arc<dyn LedgerStore>,
}

impl WithdrawalProcessor {
    pub fn new(ledger: Arc<dyn LedgerStore>) -> Self {
        Self { ledger }
    }

    /// Debit `amount` from the user's balance for `order_reference`.
    ///
    /// Fails with `ValidationError` for a bad order number, a non-positive
    /// amount or sub-cent digits, and with `BalanceError::InsufficientFunds`
    /// when the balance does not cover the amount. Nothing is written in
    /// either case.
    #[instrument(skip(self), fields(order = %order_reference))]
    pub async fn withdraw(
        &self,
        user_id: UserId,
        order_reference: &str,
        amount: Decimal,
    ) -> AppResult<Withdrawal> {
        order_number::validate(order_reference)?;

        if amount <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveAmount(amount).into());
        }
        // Balances are kept in whole cents
        if amount.normalize().scale() > 2 {
            return Err(ValidationError::ExcessivePrecision(amount).into());
        }

        match self.ledger.debit(user_id, amount, order_reference).await? {
            DebitOutcome::Ok(withdrawal) => {
                info!("💸 User {} withdrew {} for order {}", user_id, amount, order_reference);
                Ok(withdrawal)
            }
            DebitOutcome::InsufficientFunds { available } => {
                warn!(
                    "User {} cannot withdraw {}: only {} available",
                    user_id, amount, available
                );
                Err(BalanceError::InsufficientFunds {
                    required: amount,
                    available,
                }
                .into())
            }
        }
    }
}
