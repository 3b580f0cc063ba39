use super::models::*;
use super::store::LedgerStore;
use crate::error::{AppResult, OrderError, ValidationError};
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, info, instrument};

/// Ledger repository - THE source of truth for orders and balances
pub struct LedgerRepository {
    pub pool: PgPool,
}

impl LedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn begin_tx(&self) -> AppResult<Transaction<'_, Postgres>> {
        Ok(self.pool.begin().await?)
    }

    /// Credit the owner's balance inside an open settlement transaction.
    ///
    /// The balance row is created on first credit so a missing account
    /// never drops an accrual.
    async fn credit(
        tx: &mut Transaction<'_, Postgres>,
        user_id: UserId,
        amount: Decimal,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO balances (user_id, current)
            VALUES ($1, $2)
            ON CONFLICT (user_id)
            DO UPDATE SET
                current = balances.current + EXCLUDED.current,
                updated_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(amount)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl LedgerStore for LedgerRepository {
    // ========== ACCOUNT OPERATIONS ==========

    async fn open_account(&self, user_id: UserId) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO balances (user_id)
            VALUES ($1)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ========== ORDER OPERATIONS ==========

    /// The unique key on `number` arbitrates concurrent first submissions:
    /// exactly one INSERT wins, every loser reads the winner's owner.
    #[instrument(skip(self), fields(order = %number))]
    async fn claim_order(&self, number: &str, owner: UserId) -> AppResult<ClaimOutcome> {
        let mut tx = self.begin_tx().await?;

        let inserted = sqlx::query_scalar::<_, String>(
            r#"
            INSERT INTO orders (number, owner_id, status)
            VALUES ($1, $2, $3)
            ON CONFLICT (number) DO NOTHING
            RETURNING number
            "#,
        )
        .bind(number)
        .bind(owner)
        .bind(OrderStatus::New)
        .fetch_optional(&mut *tx)
        .await?;

        if inserted.is_some() {
            tx.commit().await?;
            info!("Order {} claimed by user {}", number, owner);
            return Ok(ClaimOutcome::Created);
        }

        let existing_owner = sqlx::query_scalar::<_, UserId>(
            r#"
            SELECT owner_id FROM orders WHERE number = $1 FOR SHARE
            "#,
        )
        .bind(number)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        if existing_owner == owner {
            Ok(ClaimOutcome::AlreadyOwnedBySelf)
        } else {
            Ok(ClaimOutcome::AlreadyOwnedByOther)
        }
    }

    async fn list_unreconciled(&self) -> AppResult<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(
            r#"
            SELECT number, owner_id, status, accrual, uploaded_at
            FROM orders
            WHERE status IN ($1, $2)
            ORDER BY uploaded_at
            "#,
        )
        .bind(OrderStatus::New)
        .bind(OrderStatus::Processing)
        .fetch_all(&self.pool)
        .await?;

        debug!("Found {} unreconciled orders", orders.len());
        Ok(orders)
    }

    /// The order row is re-read under FOR UPDATE, so a concurrent settlement
    /// of the same order waits here and then observes the terminal status.
    #[instrument(skip(self), fields(order = %number))]
    async fn settle(
        &self,
        number: &str,
        status: OrderStatus,
        accrual: Decimal,
    ) -> AppResult<SettleOutcome> {
        if accrual < Decimal::ZERO {
            return Err(ValidationError::NegativeAccrual(accrual).into());
        }

        let mut tx = self.begin_tx().await?;

        let row = sqlx::query_as::<_, (UserId, OrderStatus)>(
            r#"
            SELECT owner_id, status FROM orders WHERE number = $1 FOR UPDATE
            "#,
        )
        .bind(number)
        .fetch_optional(&mut *tx)
        .await?;

        let (owner, current) =
            row.ok_or_else(|| OrderError::NotFound(number.to_string()))?;

        if current.is_terminal() {
            tx.rollback().await?;
            debug!("Order {} already {}, skipping settlement", number, current);
            return Ok(SettleOutcome::AlreadyTerminal);
        }

        if !current.can_transition_to(status) {
            tx.rollback().await?;
            return Ok(SettleOutcome::Unchanged);
        }

        let credited = if status == OrderStatus::Processed {
            accrual
        } else {
            Decimal::ZERO
        };

        sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, accrual = $3
            WHERE number = $1
            "#,
        )
        .bind(number)
        .bind(status)
        .bind((status == OrderStatus::Processed).then_some(credited))
        .execute(&mut *tx)
        .await?;

        if status == OrderStatus::Processed {
            Self::credit(&mut tx, owner, credited).await?;
        }

        tx.commit().await?;

        info!(
            "Order {} settled: {} -> {} (credited {} to user {})",
            number, current, status, credited, owner
        );

        Ok(SettleOutcome::Applied { credited })
    }

    // ========== BALANCE OPERATIONS ==========

    #[instrument(skip(self))]
    async fn debit(
        &self,
        user_id: UserId,
        amount: Decimal,
        order_reference: &str,
    ) -> AppResult<DebitOutcome> {
        let mut tx = self.begin_tx().await?;

        let current = sqlx::query_scalar::<_, Decimal>(
            r#"
            SELECT current FROM balances WHERE user_id = $1 FOR UPDATE
            "#,
        )
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .unwrap_or(Decimal::ZERO);

        if current < amount {
            tx.rollback().await?;
            return Ok(DebitOutcome::InsufficientFunds { available: current });
        }

        sqlx::query(
            r#"
            UPDATE balances
            SET current = current - $2,
                withdrawn = withdrawn + $2,
                updated_at = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(amount)
        .execute(&mut *tx)
        .await?;

        let withdrawal = sqlx::query_as::<_, Withdrawal>(
            r#"
            INSERT INTO withdrawals (user_id, order_number, amount)
            VALUES ($1, $2, $3)
            RETURNING order_number, amount, processed_at
            "#,
        )
        .bind(user_id)
        .bind(order_reference)
        .bind(amount)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            "User {} withdrew {} against order {}",
            user_id, amount, order_reference
        );

        Ok(DebitOutcome::Ok(withdrawal))
    }

    // ========== READ MODELS ==========

    async fn orders_for(&self, owner: UserId) -> AppResult<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(
            r#"
            SELECT number, owner_id, status, accrual, uploaded_at
            FROM orders
            WHERE owner_id = $1
            ORDER BY uploaded_at DESC
            "#,
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        Ok(orders)
    }

    async fn balance(&self, user_id: UserId) -> AppResult<Balance> {
        let balance = sqlx::query_as::<_, Balance>(
            r#"
            SELECT current, withdrawn FROM balances WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(balance.unwrap_or_default())
    }

    async fn withdrawals_for(&self, user_id: UserId) -> AppResult<Vec<Withdrawal>> {
        let withdrawals = sqlx::query_as::<_, Withdrawal>(
            r#"
            SELECT order_number, amount, processed_at
            FROM withdrawals
            WHERE user_id = $1
            ORDER BY processed_at DESC, id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(withdrawals)
    }
}
