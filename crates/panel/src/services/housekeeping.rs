//! Periodic cleanup.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::db::{PaymentBinStore, RepositoryError};

/// Delete expired staging records once.
///
/// # Errors
///
/// Returns `RepositoryError` if the store fails.
pub async fn purge_payment_bins(bins: &dyn PaymentBinStore) -> Result<u64, RepositoryError> {
    let purged = bins.purge_expired().await?;
    if purged > 0 {
        tracing::info!(purged, "Purged expired payment bins");
    } else {
        tracing::debug!("No expired payment bins");
    }
    Ok(purged)
}

/// Run [`purge_payment_bins`] every `every`, starting immediately.
///
/// Failures are logged and the loop keeps going.
pub fn spawn_payment_bin_sweeper(bins: Arc<dyn PaymentBinStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = purge_payment_bins(bins.as_ref()).await {
                tracing::error!(error = %e, "Payment bin sweep failed");
            }
        }
    })
}
