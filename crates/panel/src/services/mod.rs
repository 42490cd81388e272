//! Business logic services for the panel.
//!
//! # Services
//!
//! - `reconciliation` - ZenoPay top-ups: initiation and webhook reconciliation
//! - `housekeeping` - Periodic purge of expired payment staging records

pub mod housekeeping;
pub mod reconciliation;

pub use reconciliation::{
    CreditSkip, InitiatedPayment, InitiationError, ReconciliationError, ReconciliationService,
    TopUpRequest, ValidationError, WebhookOutcome,
};
