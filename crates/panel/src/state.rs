//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tokio_util::task::TaskTracker;

use crate::config::PanelConfig;
use crate::db::Ledger;
use crate::services::ReconciliationService;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: PanelConfig,
    pool: PgPool,
    reconciliation: Arc<ReconciliationService>,
    ledger: Arc<dyn Ledger>,
    background: TaskTracker,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Arguments
    ///
    /// * `config` - Panel configuration
    /// * `pool` - `PostgreSQL` connection pool
    /// * `reconciliation` - Top-up and webhook service
    /// * `ledger` - Balance ledger, read by the balance fragment
    #[must_use]
    pub fn new(
        config: PanelConfig,
        pool: PgPool,
        reconciliation: Arc<ReconciliationService>,
        ledger: Arc<dyn Ledger>,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                reconciliation,
                ledger,
                background: TaskTracker::new(),
            }),
        }
    }

    /// Get a reference to the panel configuration.
    #[must_use]
    pub fn config(&self) -> &PanelConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Get a handle to the reconciliation service.
    ///
    /// Returned as an `Arc` so background tasks can outlive the request.
    #[must_use]
    pub fn reconciliation(&self) -> Arc<ReconciliationService> {
        Arc::clone(&self.inner.reconciliation)
    }

    /// Get a reference to the balance ledger.
    #[must_use]
    pub fn ledger(&self) -> &dyn Ledger {
        self.inner.ledger.as_ref()
    }

    /// Tracker for work that outlives its request, such as webhook
    /// reconciliation.
    #[must_use]
    pub fn background(&self) -> &TaskTracker {
        &self.inner.background
    }

    /// Stop accepting background work and wait up to `grace` for the
    /// remaining tasks.
    ///
    /// Returns `false` if tasks were still running when `grace` ran out.
    pub async fn drain_background(&self, grace: Duration) -> bool {
        let tracker = &self.inner.background;
        tracker.close();
        tokio::time::timeout(grace, tracker.wait()).await.is_ok()
    }
}

