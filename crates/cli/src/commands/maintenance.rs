//! One-off maintenance commands.
//!
//! The panel server already sweeps expired payment staging records on a
//! timer; this runs the same sweep once, e.g. from cron while the server is
//! down.

use spoti_boost_panel::db::PaymentBinRepository;
use spoti_boost_panel::services::housekeeping;

use super::{CommandError, connect};

/// Delete payment staging records older than the retention window.
///
/// # Errors
///
/// Returns `CommandError` if the database is unreachable or the delete fails.
pub async fn purge_payment_bins() -> Result<u64, CommandError> {
    let pool = connect().await?;
    let bins = PaymentBinRepository::new(pool);

    let purged = housekeeping::purge_payment_bins(&bins).await?;
    tracing::info!(purged, "Payment bin purge complete");
    Ok(purged)
}
