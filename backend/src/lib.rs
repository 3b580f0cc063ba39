pub mod accrual;
pub mod api;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod ledger;
pub mod order_number;
pub mod settlement;
pub mod withdrawal;
