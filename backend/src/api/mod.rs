// Collaborator-facing surface for the transport/auth layer
pub mod models;
pub mod service;

pub use models::{SubmitOutcome, WithdrawOutcome};
pub use service::LoyaltyService;
