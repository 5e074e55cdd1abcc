//! Withdrawal, fee and balance calls against stored exchanges
//!
//! [`WithdrawalOrchestrator`] never returns an error: every call ends in an
//! [`Outcome`] that converts into the [`ApiEnvelope`] callers receive.

pub mod orchestrator;
pub mod outcome;

pub use orchestrator::{WithdrawalOrchestrator, WithdrawalRequest};
pub use outcome::{ApiEnvelope, Failure, Outcome, WithdrawalOutcome, WithdrawalSuccess};
