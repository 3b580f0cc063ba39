//! In-memory ledger store
//!
//! `MemoryLedger` implements `LedgerStore` over two `DashMap`s, one for
//! order rows and one for account rows. A `DashMap` entry guard plays the
//! role of a row lock: operations on different orders or users proceed in
//! parallel, operations on the same row serialize.
//!
//! Lock order is always order row first, then account row. `debit` only
//! touches the account row, so no cycle is possible.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rust_decimal::Decimal;

use super::models::*;
use super::store::LedgerStore;
use crate::error::{AppResult, OrderError, ValidationError};

#[derive(Debug, Default)]
struct Account {
    balance: Balance,
    withdrawals: Vec<Withdrawal>,
}

#[derive(Debug, Default)]
pub struct MemoryLedger {
    orders: DashMap<String, Order>,
    accounts: DashMap<UserId, Account>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up one order by number.
    pub fn order(&self, number: &str) -> Option<Order> {
        self.orders.get(number).map(|order| order.clone())
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn open_account(&self, user_id: UserId) -> AppResult<()> {
        self.accounts.entry(user_id).or_default();
        Ok(())
    }

    async fn claim_order(&self, number: &str, owner: UserId) -> AppResult<ClaimOutcome> {
        match self.orders.entry(number.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(Order::new(number, owner));
                Ok(ClaimOutcome::Created)
            }
            Entry::Occupied(existing) if existing.get().owner_id == owner => {
                Ok(ClaimOutcome::AlreadyOwnedBySelf)
            }
            Entry::Occupied(_) => Ok(ClaimOutcome::AlreadyOwnedByOther),
        }
    }

    async fn list_unreconciled(&self) -> AppResult<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|order| !order.is_reconciled())
            .map(|order| order.clone())
            .collect();
        orders.sort_by_key(|order| order.uploaded_at);
        Ok(orders)
    }

    async fn settle(
        &self,
        number: &str,
        status: OrderStatus,
        accrual: Decimal,
    ) -> AppResult<SettleOutcome> {
        if accrual < Decimal::ZERO {
            return Err(ValidationError::NegativeAccrual(accrual).into());
        }

        let mut order = self
            .orders
            .get_mut(number)
            .ok_or_else(|| OrderError::NotFound(number.to_string()))?;

        if order.status.is_terminal() {
            return Ok(SettleOutcome::AlreadyTerminal);
        }
        if !order.status.can_transition_to(status) {
            return Ok(SettleOutcome::Unchanged);
        }

        let credited = if status == OrderStatus::Processed {
            // Credit while the order row is still held
            let mut account = self.accounts.entry(order.owner_id).or_default();
            account.balance.current += accrual;
            order.accrual = Some(accrual);
            accrual
        } else {
            Decimal::ZERO
        };
        order.status = status;

        Ok(SettleOutcome::Applied { credited })
    }

    async fn debit(
        &self,
        user_id: UserId,
        amount: Decimal,
        order_reference: &str,
    ) -> AppResult<DebitOutcome> {
        let Some(mut account) = self.accounts.get_mut(&user_id) else {
            return Ok(DebitOutcome::InsufficientFunds {
                available: Decimal::ZERO,
            });
        };

        if !account.balance.has_available(amount) {
            return Ok(DebitOutcome::InsufficientFunds {
                available: account.balance.current,
            });
        }

        account.balance.current -= amount;
        account.balance.withdrawn += amount;

        let withdrawal = Withdrawal {
            order_number: order_reference.to_string(),
            amount,
            processed_at: Utc::now(),
        };
        account.withdrawals.push(withdrawal.clone());

        Ok(DebitOutcome::Ok(withdrawal))
    }

    async fn orders_for(&self, owner: UserId) -> AppResult<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|order| order.owner_id == owner)
            .map(|order| order.clone())
            .collect();
        orders.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(orders)
    }

    async fn balance(&self, user_id: UserId) -> AppResult<Balance> {
        Ok(self
            .accounts
            .get(&user_id)
            .map(|account| account.balance)
            .unwrap_or_default())
    }

    async fn withdrawals_for(&self, user_id: UserId) -> AppResult<Vec<Withdrawal>> {
        Ok(self
            .accounts
            .get(&user_id)
            .map(|account| account.withdrawals.iter().rev().cloned().collect())
            .unwrap_or_default())
    }
}
