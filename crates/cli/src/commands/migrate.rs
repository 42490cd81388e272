//! Database migration command.
//!
//! # Usage
//!
//! ```bash
//! spoti-cli migrate
//! ```
//!
//! # Environment Variables
//!
//! - `PANEL_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//!
//! # Migration Files
//!
//! Panel migrations live in `crates/panel/migrations/` and are embedded at
//! compile time.

use super::{CommandError, connect};

/// Run panel database migrations.
///
/// # Errors
///
/// Returns `CommandError` if the database is unreachable or a migration fails.
pub async fn panel() -> Result<(), CommandError> {
    let pool = connect().await?;

    tracing::info!("Running panel migrations...");
    sqlx::migrate!("../panel/migrations").run(&pool).await?;

    tracing::info!("Panel migrations complete!");
    Ok(())
}
