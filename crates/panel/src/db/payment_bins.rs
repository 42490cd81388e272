//! Payment staging store.
//!
//! Postgres has no TTL index, so expiry is enforced twice: reads ignore rows
//! older than [`PAYMENT_BIN_TTL_HOURS`], and [`PaymentBinStore::purge_expired`]
//! deletes them on a timer.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use spoti_boost_core::{Email, Msisdn, PaymentOrderId, PaymentStatus};

use super::{RepositoryError, is_unique_violation};
use crate::models::{NewPaymentRecord, PAYMENT_BIN_TTL_HOURS, PaymentRecord, PaymentUpdate};

/// Errors from the staging store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A record with this order id already exists.
    #[error("duplicate order id: {0}")]
    DuplicateOrder(PaymentOrderId),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Storage for in-flight payment attempts.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentBinStore: Send + Sync {
    /// Insert a new `PENDING` record.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::DuplicateOrder` if the order id is taken.
    async fn create(&self, record: NewPaymentRecord) -> Result<PaymentRecord, StoreError>;

    /// Look up a live record. Expired records are reported as absent.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the backend fails.
    async fn find_by_order_id(
        &self,
        order_id: &PaymentOrderId,
    ) -> Result<Option<PaymentRecord>, RepositoryError>;

    /// Apply a webhook update and return the new state, or `None` if there
    /// is no live record with this id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the backend fails.
    async fn update(
        &self,
        order_id: &PaymentOrderId,
        update: PaymentUpdate,
    ) -> Result<Option<PaymentRecord>, RepositoryError>;

    /// Delete a record that is still `PENDING`. Returns whether a row went.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the backend fails.
    async fn discard_pending(&self, order_id: &PaymentOrderId) -> Result<bool, RepositoryError>;

    /// Delete every expired record and return how many were removed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the backend fails.
    async fn purge_expired(&self) -> Result<u64, RepositoryError>;
}

#[derive(sqlx::FromRow)]
struct PaymentBinRow {
    order_id: String,
    email: String,
    phone: String,
    status: PaymentStatus,
    reference: Option<String>,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentBinRow> for PaymentRecord {
    type Error = RepositoryError;

    fn try_from(row: PaymentBinRow) -> Result<Self, Self::Error> {
        let order_id = PaymentOrderId::from_external(&row.order_id)
            .ok_or_else(|| RepositoryError::DataCorruption("blank order id".to_owned()))?;
        let email = Email::parse(&row.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;

        Ok(Self {
            order_id,
            email,
            phone: Msisdn::from_trusted(row.phone),
            status: row.status,
            reference: row.reference,
            metadata: row.metadata,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Postgres-backed [`PaymentBinStore`].
#[derive(Clone)]
pub struct PaymentBinRepository {
    pool: PgPool,
}

impl PaymentBinRepository {
    /// Create a new repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentBinStore for PaymentBinRepository {
    async fn create(&self, record: NewPaymentRecord) -> Result<PaymentRecord, StoreError> {
        let row = sqlx::query_as::<_, PaymentBinRow>(
            r"
            INSERT INTO panel.payment_bin (order_id, email, phone, status, metadata)
            VALUES ($1, $2, $3, 'PENDING', $4)
            RETURNING order_id, email, phone, status, reference, metadata,
                      created_at, updated_at
            ",
        )
        .bind(record.order_id.as_str())
        .bind(record.email.as_str())
        .bind(record.phone.as_str())
        .bind(&record.metadata)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                return StoreError::DuplicateOrder(record.order_id.clone());
            }
            StoreError::Repository(RepositoryError::Database(e))
        })?;

        Ok(PaymentRecord::try_from(row)?)
    }

    async fn find_by_order_id(
        &self,
        order_id: &PaymentOrderId,
    ) -> Result<Option<PaymentRecord>, RepositoryError> {
        let row = sqlx::query_as::<_, PaymentBinRow>(
            r"
            SELECT order_id, email, phone, status, reference, metadata,
                   created_at, updated_at
            FROM panel.payment_bin
            WHERE order_id = $1
              AND created_at > NOW() - make_interval(hours => $2)
            ",
        )
        .bind(order_id.as_str())
        .bind(ttl_hours())
        .fetch_optional(&self.pool)
        .await?;

        row.map(PaymentRecord::try_from).transpose()
    }

    async fn update(
        &self,
        order_id: &PaymentOrderId,
        update: PaymentUpdate,
    ) -> Result<Option<PaymentRecord>, RepositoryError> {
        let row = sqlx::query_as::<_, PaymentBinRow>(
            r"
            UPDATE panel.payment_bin
            SET status = COALESCE($2, status),
                reference = COALESCE($3, reference),
                updated_at = NOW()
            WHERE order_id = $1
              AND created_at > NOW() - make_interval(hours => $4)
            RETURNING order_id, email, phone, status, reference, metadata,
                      created_at, updated_at
            ",
        )
        .bind(order_id.as_str())
        .bind(update.status)
        .bind(update.reference)
        .bind(ttl_hours())
        .fetch_optional(&self.pool)
        .await?;

        row.map(PaymentRecord::try_from).transpose()
    }

    async fn discard_pending(&self, order_id: &PaymentOrderId) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            DELETE FROM panel.payment_bin
            WHERE order_id = $1 AND status = 'PENDING'
            ",
        )
        .bind(order_id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn purge_expired(&self) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r"
            DELETE FROM panel.payment_bin
            WHERE created_at <= NOW() - make_interval(hours => $1)
            ",
        )
        .bind(ttl_hours())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

fn ttl_hours() -> i32 {
    i32::try_from(PAYMENT_BIN_TTL_HOURS).unwrap_or(i32::MAX)
}
