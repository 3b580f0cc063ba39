// Settlement - reconciles unreconciled orders against the accrual service
pub mod scheduler;
pub mod worker;

pub use scheduler::{
    Dispatch, Dispatcher, ReconciliationScheduleConfig, ReconciliationScheduler, SchedulerHandle,
    TickReport,
};
pub use worker::{AttemptResult, SettlementWorker};
