// Accrual service integration
pub mod client;
pub mod models;

pub use client::{AccrualClient, HttpAccrualClient};
pub use models::{AccrualOutcome, AccrualResponse, AccrualStatus};
