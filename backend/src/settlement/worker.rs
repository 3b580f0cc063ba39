// Settlement Worker - one unit of reconciliation work for one order
//
// Flow:
// 1. Re-validate the order number
// 2. Query the accrual service
// 3. Apply a final or forward status to the ledger
//
// Every failure leaves the order unreconciled; the next scheduler tick
// rediscovers it. Nothing is escalated.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::accrual::{AccrualClient, AccrualOutcome};
use crate::ledger::models::{Order, SettleOutcome};
use crate::ledger::LedgerStore;
use crate::order_number;

/// What a single settlement attempt ended with
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptResult {
    Settled(SettleOutcome),
    Pending,
    /// Backed off for the advertised wait, order left for a later tick
    RateLimited(Duration),
    Abandoned,
}

pub struct SettlementWorker {
    ledger: Arc<dyn LedgerStore>,
    accrual: Arc<dyn AccrualClient>,
    shutdown: CancellationToken,
}

impl SettlementWorker {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        accrual: Arc<dyn AccrualClient>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            ledger,
            accrual,
            shutdown,
        }
    }

    /// Reconcile one order. Never holds a store transaction while waiting on
    /// the network or on a rate-limit backoff.
    #[instrument(skip(self, order), fields(order = %order.number))]
    pub async fn process(&self, order: &Order) -> AttemptResult {
        if let Err(e) = order_number::validate(&order.number) {
            error!("Skipping order with invalid number: {}", e);
            return AttemptResult::Abandoned;
        }

        match self.accrual.query(&order.number).await {
            AccrualOutcome::Settled { status, accrual } => {
                match self.ledger.settle(&order.number, status, accrual).await {
                    Ok(outcome) => {
                        if let SettleOutcome::Applied { credited } = outcome {
                            info!("✓ Order {} -> {} (accrual {})", order.number, status, credited);
                        }
                        AttemptResult::Settled(outcome)
                    }
                    Err(e) if e.is_retryable() => {
                        warn!("Settlement of {} failed, retrying next tick: {}", order.number, e);
                        AttemptResult::Abandoned
                    }
                    Err(e) => {
                        error!("❌ Failed to settle order {}: {:?}", order.number, e);
                        AttemptResult::Abandoned
                    }
                }
            }
            AccrualOutcome::Pending => {
                debug!("Order {} still registered, waiting", order.number);
                AttemptResult::Pending
            }
            AccrualOutcome::RateLimited { retry_after } => {
                warn!(
                    "⏳ Rate limited on order {}, backing off {:?}",
                    order.number, retry_after
                );
                // Shutdown cuts the backoff short; nothing is pending to write
                tokio::select! {
                    _ = tokio::time::sleep(retry_after) => {}
                    _ = self.shutdown.cancelled() => {}
                }
                AttemptResult::RateLimited(retry_after)
            }
            AccrualOutcome::NotFound => {
                debug!("Order {} unknown to accrual service", order.number);
                AttemptResult::Abandoned
            }
            AccrualOutcome::Transient(reason) => {
                warn!("Transient accrual failure for {}: {}", order.number, reason);
                AttemptResult::Abandoned
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ledger::models::OrderStatus;
    use crate::ledger::MemoryLedger;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::collections::{HashMap, VecDeque};

    /// Accrual service fake: scripted outcomes per order, with a call log
    #[derive(Default)]
    pub(crate) struct ScriptedAccrual {
        script: Mutex<HashMap<String, VecDeque<AccrualOutcome>>>,
        calls: Mutex<Vec<(String, tokio::time::Instant)>>,
    }

    impl ScriptedAccrual {
        pub(crate) fn respond(&self, number: &str, outcome: AccrualOutcome) {
            self.script
                .lock()
                .entry(number.to_string())
                .or_default()
                .push_back(outcome);
        }

        pub(crate) fn calls_for(&self, number: &str) -> Vec<tokio::time::Instant> {
            self.calls
                .lock()
                .iter()
                .filter(|(n, _)| n == number)
                .map(|(_, at)| *at)
                .collect()
        }
    }

    #[async_trait]
    impl AccrualClient for ScriptedAccrual {
        async fn query(&self, order_number: &str) -> AccrualOutcome {
            self.calls
                .lock()
                .push((order_number.to_string(), tokio::time::Instant::now()));

            // The last scripted outcome repeats once the queue is drained
            let mut script = self.script.lock();
            match script.get_mut(order_number) {
                Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(AccrualOutcome::NotFound),
                Some(queue) => queue.front().cloned().unwrap_or(AccrualOutcome::NotFound),
                None => AccrualOutcome::NotFound,
            }
        }
    }

    pub(crate) fn processed(accrual: Decimal) -> AccrualOutcome {
        AccrualOutcome::Settled {
            status: OrderStatus::Processed,
            accrual,
        }
    }

    const ORDER: &str = "9278923470";

    async fn setup() -> (Arc<MemoryLedger>, Arc<ScriptedAccrual>, SettlementWorker) {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.open_account(1).await.unwrap();
        ledger.claim_order(ORDER, 1).await.unwrap();

        let accrual = Arc::new(ScriptedAccrual::default());
        let worker = SettlementWorker::new(ledger.clone(), accrual.clone(), CancellationToken::new());
        (ledger, accrual, worker)
    }

    #[tokio::test]
    async fn test_processed_order_is_credited() {
        let (ledger, accrual, worker) = setup().await;
        accrual.respond(ORDER, processed(dec!(500)));

        let order = ledger.order(ORDER).unwrap();
        let result = worker.process(&order).await;

        assert_eq!(
            result,
            AttemptResult::Settled(SettleOutcome::Applied { credited: dec!(500) })
        );
        assert_eq!(ledger.balance(1).await.unwrap().current, dec!(500));
        assert_eq!(ledger.order(ORDER).unwrap().status, OrderStatus::Processed);
    }

    #[tokio::test]
    async fn test_stale_snapshot_does_not_double_credit() {
        let (ledger, accrual, worker) = setup().await;
        accrual.respond(ORDER, processed(dec!(500)));

        // Both attempts work from the same pre-settlement snapshot
        let snapshot = ledger.order(ORDER).unwrap();
        worker.process(&snapshot).await;
        let second = worker.process(&snapshot).await;

        assert_eq!(second, AttemptResult::Settled(SettleOutcome::AlreadyTerminal));
        assert_eq!(ledger.balance(1).await.unwrap().current, dec!(500));
    }

    #[tokio::test]
    async fn test_pending_writes_nothing() {
        let (ledger, accrual, worker) = setup().await;
        accrual.respond(ORDER, AccrualOutcome::Pending);

        let order = ledger.order(ORDER).unwrap();
        assert_eq!(worker.process(&order).await, AttemptResult::Pending);
        assert_eq!(ledger.order(ORDER).unwrap().status, OrderStatus::New);
    }

    #[tokio::test]
    async fn test_transient_and_unknown_are_abandoned() {
        let (ledger, accrual, worker) = setup().await;
        accrual.respond(ORDER, AccrualOutcome::Transient("503".into()));

        let order = ledger.order(ORDER).unwrap();
        assert_eq!(worker.process(&order).await, AttemptResult::Abandoned);

        let unknown = Order::new("12345678903", 1);
        assert_eq!(worker.process(&unknown).await, AttemptResult::Abandoned);
        assert_eq!(ledger.list_unreconciled().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_negative_accrual_never_reaches_balance() {
        let (ledger, accrual, worker) = setup().await;
        accrual.respond(
            ORDER,
            AccrualOutcome::Settled {
                status: OrderStatus::Processed,
                accrual: dec!(-50),
            },
        );

        let order = ledger.order(ORDER).unwrap();
        assert_eq!(worker.process(&order).await, AttemptResult::Abandoned);

        let balance = ledger.balance(1).await.unwrap();
        assert_eq!(balance.current, dec!(0));
        assert_eq!(ledger.order(ORDER).unwrap().status, OrderStatus::New);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_backs_off_before_returning() {
        let (ledger, accrual, worker) = setup().await;
        accrual.respond(
            ORDER,
            AccrualOutcome::RateLimited {
                retry_after: Duration::from_secs(2),
            },
        );

        let order = ledger.order(ORDER).unwrap();
        let started = tokio::time::Instant::now();
        let result = worker.process(&order).await;

        assert_eq!(result, AttemptResult::RateLimited(Duration::from_secs(2)));
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert!(!ledger.order(ORDER).unwrap().status.is_terminal());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cuts_backoff_short() {
        let (ledger, accrual, _) = setup().await;
        accrual.respond(
            ORDER,
            AccrualOutcome::RateLimited {
                retry_after: Duration::from_secs(600),
            },
        );
        let shutdown = CancellationToken::new();
        let worker = SettlementWorker::new(ledger.clone(), accrual.clone(), shutdown.clone());
        shutdown.cancel();

        let order = ledger.order(ORDER).unwrap();
        let started = tokio::time::Instant::now();
        worker.process(&order).await;
        assert!(started.elapsed() < Duration::from_secs(600));
    }

    #[tokio::test]
    async fn test_invalid_number_is_never_queried() {
        let (_, accrual, worker) = setup().await;

        let order = Order::new("1", 1);
        assert_eq!(worker.process(&order).await, AttemptResult::Abandoned);
        assert!(accrual.calls_for("1").is_empty());
    }
}
