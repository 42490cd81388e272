//! Subcommand implementations.

pub mod balance;
pub mod maintenance;
pub mod migrate;

use secrecy::SecretString;
use sqlx::PgPool;
use thiserror::Error;

use spoti_boost_panel::db;

/// Errors shared by commands that talk to the panel database.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    /// Database connection error.
    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration failed.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Repository operation failed.
    #[error(transparent)]
    Repository(#[from] db::RepositoryError),

    /// Ledger operation failed.
    #[error(transparent)]
    Ledger(#[from] db::LedgerError),

    /// Input rejected before touching the database.
    #[error("Invalid {0}: {1}")]
    InvalidInput(&'static str, String),

    /// No account for the given email.
    #[error("No account with email: {0}")]
    UnknownUser(String),
}

/// Connect to the panel database.
///
/// Reads `PANEL_DATABASE_URL`, falling back to `DATABASE_URL`.
pub async fn connect() -> Result<PgPool, CommandError> {
    dotenvy::dotenv().ok();

    let database_url = std::env::var("PANEL_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map(SecretString::from)
        .map_err(|_| CommandError::MissingEnvVar("PANEL_DATABASE_URL"))?;

    tracing::info!("Connecting to panel database...");
    Ok(db::create_pool(&database_url).await?)
}
