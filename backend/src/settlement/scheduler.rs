// Reconciliation Scheduler - drives settlement of unreconciled orders
//
// Every tick:
// - Snapshot all orders not yet PROCESSED/INVALID
// - Offer each to a bounded queue feeding a fixed pool of workers
// - Orders already queued or in flight are skipped
// - When the queue is full the rest wait for the next tick
//
// The scheduler keeps no per-order state between ticks. All progress lives
// in the ledger, so a restart simply rediscovers whatever is unreconciled.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::worker::SettlementWorker;
use crate::accrual::AccrualClient;
use crate::config::Config;
use crate::error::AppResult;
use crate::ledger::models::Order;
use crate::ledger::LedgerStore;

/// Reconciliation schedule configuration
#[derive(Debug, Clone)]
pub struct ReconciliationScheduleConfig {
    /// Time between two discovery passes
    pub poll_interval: Duration,
    /// Number of concurrent settlement workers
    pub worker_count: usize,
    /// Capacity of the queue between scheduler and workers
    pub queue_capacity: usize,
}

impl Default for ReconciliationScheduleConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            worker_count: 10,
            queue_capacity: 10,
        }
    }
}

impl From<&Config> for ReconciliationScheduleConfig {
    fn from(config: &Config) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            worker_count: config.worker_count,
            queue_capacity: config.queue_capacity,
        }
    }
}

/// Outcome of offering one order to the worker pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Queued,
    /// Already queued or being worked on
    InFlight,
    /// Queue full, retried next tick
    Deferred,
    /// Workers are gone (shutting down)
    Closed,
}

/// Summary of one scheduler tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub discovered: usize,
    pub queued: usize,
    pub in_flight: usize,
    pub deferred: usize,
}

/// Sending half of the worker queue plus the set of orders it currently
/// holds or that workers are processing.
#[derive(Clone)]
pub struct Dispatcher {
    sender: mpsc::Sender<Order>,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl Dispatcher {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Order>) {
        let (sender, receiver) = mpsc::channel(capacity);
        let dispatcher = Self {
            sender,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        };
        (dispatcher, receiver)
    }

    /// Offer an order without waiting for queue space.
    pub fn dispatch(&self, order: Order) -> Dispatch {
        let number = order.number.clone();
        if !self.in_flight.lock().insert(number.clone()) {
            return Dispatch::InFlight;
        }

        match self.sender.try_send(order) {
            Ok(()) => Dispatch::Queued,
            Err(TrySendError::Full(_)) => {
                self.in_flight.lock().remove(&number);
                Dispatch::Deferred
            }
            Err(TrySendError::Closed(_)) => {
                self.in_flight.lock().remove(&number);
                Dispatch::Closed
            }
        }
    }

    /// Called by a worker once it is done with an order.
    pub fn complete(&self, number: &str) {
        self.in_flight.lock().remove(number);
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }
}

/// Reconciliation scheduler - owns the tick loop and the worker pool
pub struct ReconciliationScheduler {
    config: ReconciliationScheduleConfig,
    ledger: Arc<dyn LedgerStore>,
    accrual: Arc<dyn AccrualClient>,
}

/// Running scheduler; dropping it does not stop anything, call `shutdown`
pub struct SchedulerHandle {
    shutdown: CancellationToken,
    tick_loop: JoinHandle<()>,
    workers: Vec<JoinHandle<()>>,
}

impl ReconciliationScheduler {
    pub fn new(
        config: ReconciliationScheduleConfig,
        ledger: Arc<dyn LedgerStore>,
        accrual: Arc<dyn AccrualClient>,
    ) -> Self {
        Self {
            config,
            ledger,
            accrual,
        }
    }

    /// Start the tick loop and worker pool (runs in background)
    pub fn start(self, shutdown: CancellationToken) -> SchedulerHandle {
        let worker_count = self.config.worker_count.max(1);
        let (dispatcher, receiver) = Dispatcher::new(self.config.queue_capacity.max(1));
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

        let worker = Arc::new(SettlementWorker::new(
            self.ledger.clone(),
            self.accrual.clone(),
            shutdown.clone(),
        ));

        let workers = (0..worker_count)
            .map(|id| {
                tokio::spawn(Self::run_worker(
                    id,
                    worker.clone(),
                    receiver.clone(),
                    dispatcher.clone(),
                    shutdown.clone(),
                ))
            })
            .collect();

        info!(
            "🔄 Reconciliation scheduler started: every {:?}, {} workers, queue {}",
            self.config.poll_interval, worker_count, self.config.queue_capacity
        );

        let tick_loop = tokio::spawn(self.run_ticks(dispatcher, shutdown.clone()));

        SchedulerHandle {
            shutdown,
            tick_loop,
            workers,
        }
    }

    async fn run_ticks(self, dispatcher: Dispatcher, shutdown: CancellationToken) {
        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.tick(&dispatcher).await {
                        // Per-tick failures never stop the loop
                        error!("❌ Reconciliation tick failed: {:?}", e);
                    }
                }
            }
        }

        info!("Reconciliation scheduler stopped issuing ticks");
    }

    /// One discovery pass.
    pub async fn tick(&self, dispatcher: &Dispatcher) -> AppResult<TickReport> {
        let orders = self.ledger.list_unreconciled().await?;

        let mut report = TickReport {
            discovered: orders.len(),
            ..TickReport::default()
        };

        for order in orders {
            match dispatcher.dispatch(order) {
                Dispatch::Queued => report.queued += 1,
                Dispatch::InFlight => report.in_flight += 1,
                Dispatch::Deferred => report.deferred += 1,
                Dispatch::Closed => {
                    warn!("Worker queue closed, abandoning tick");
                    break;
                }
            }
        }

        if report.discovered > 0 {
            debug!(
                "Tick: {} unreconciled, {} queued, {} in flight, {} deferred",
                report.discovered, report.queued, report.in_flight, report.deferred
            );
        }

        Ok(report)
    }

    async fn run_worker(
        id: usize,
        worker: Arc<SettlementWorker>,
        receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<Order>>>,
        dispatcher: Dispatcher,
        shutdown: CancellationToken,
    ) {
        loop {
            let next = {
                let mut receiver = receiver.lock().await;
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => None,
                    order = receiver.recv() => order,
                }
            };

            let Some(order) = next else { break };

            // A started unit of work always runs to completion
            worker.process(&order).await;
            dispatcher.complete(&order.number);
        }

        debug!("Settlement worker {} exited", id);
    }
}

impl SchedulerHandle {
    /// Stop ticking, let in-flight settlements finish, then return.
    ///
    /// Orders still sitting in the queue are dropped and rediscovered on the
    /// next start.
    pub async fn shutdown(self) -> AppResult<()> {
        self.shutdown.cancel();

        self.tick_loop.await?;
        for result in futures::future::join_all(self.workers).await {
            result?;
        }

        info!("✓ Reconciliation scheduler shut down");
        Ok(())
    }
}
