//! Persistence for the panel.
//!
//! # Database: `spoti_boost`
//!
//! ## Tables (schema `panel`)
//!
//! - `user` - Panel accounts and their balance
//! - `transaction` - Append-only balance ledger
//! - `payment_bin` - Short-lived staging records for gateway payments
//! - `session` - Tower-sessions storage
//!
//! Each store is a trait so the reconciliation service can run against
//! Postgres in production and against [`memory`] in tests.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/panel/migrations/` and run via:
//! ```bash
//! cargo run -p spoti-boost-cli -- migrate
//! ```

pub mod ledger;
pub mod memory;
pub mod payment_bins;
pub mod users;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use ledger::{CreditOutcome, Ledger, LedgerError, LedgerRepository};
pub use payment_bins::{PaymentBinRepository, PaymentBinStore, StoreError};
pub use users::{UserDirectory, UserRepository};

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Whether a sqlx error is a unique constraint violation.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
