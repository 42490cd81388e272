//! Balance ledger.
//!
//! Every balance change writes one [`Transaction`] carrying the resulting
//! balance. Changes for one user are serialized; the Postgres implementation
//! locks the user row for the length of a database transaction, so the
//! balance check, the balance update and the ledger insert commit together.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres};

use spoti_boost_core::{Amount, TransactionId, TransactionKind, UserId};

use super::{RepositoryError, is_unique_violation};
use crate::models::Transaction;

/// Errors from ledger operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("user not found: {0}")]
    UserNotFound(UserId),

    #[error("insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds {
        balance: Decimal,
        requested: Amount,
    },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        Self::Repository(RepositoryError::Database(e))
    }
}

/// Result of an idempotent credit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreditOutcome {
    /// The credit was applied and recorded.
    Applied(Transaction),
    /// An entry with the same idempotency key already exists; nothing changed.
    Duplicate,
}

/// Per-user balance and transaction history.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Add `amount` to the user's balance.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::UserNotFound` for an unknown user.
    async fn credit(
        &self,
        user_id: UserId,
        amount: Amount,
        reference: &str,
    ) -> Result<Transaction, LedgerError>;

    /// Add `amount` unless an entry with `idempotency_key` already exists.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::UserNotFound` for an unknown user.
    async fn credit_once(
        &self,
        user_id: UserId,
        amount: Amount,
        reference: &str,
        idempotency_key: &str,
    ) -> Result<CreditOutcome, LedgerError>;

    /// Take `amount` from the user's balance.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InsufficientFunds` if `amount` exceeds the
    /// balance, leaving the balance untouched.
    async fn debit(
        &self,
        user_id: UserId,
        amount: Amount,
        reference: &str,
    ) -> Result<Transaction, LedgerError>;

    /// Current balance.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::UserNotFound` for an unknown user.
    async fn balance(&self, user_id: UserId) -> Result<Decimal, LedgerError>;

    /// Latest entries, newest first.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Repository` if the backend fails.
    async fn recent_transactions(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<Transaction>, LedgerError>;
}

#[derive(sqlx::FromRow)]
struct TransactionRow {
    id: i32,
    user_id: i32,
    kind: TransactionKind,
    amount: Decimal,
    balance_after: Decimal,
    reference: Option<String>,
    idempotency_key: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = RepositoryError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        let amount = Amount::new(row.amount).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid transaction amount: {e}"))
        })?;

        Ok(Self {
            id: TransactionId::new(row.id),
            user_id: UserId::new(row.user_id),
            kind: row.kind,
            amount,
            balance_after: row.balance_after,
            reference: row.reference,
            idempotency_key: row.idempotency_key,
            created_at: row.created_at,
        })
    }
}

/// Postgres-backed [`Ledger`].
#[derive(Clone)]
pub struct LedgerRepository {
    pool: PgPool,
}

impl LedgerRepository {
    /// Create a new ledger repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply one movement inside an open transaction that already holds the
    /// user's row lock.
    async fn apply(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        user_id: UserId,
        kind: TransactionKind,
        amount: Amount,
        reference: &str,
        idempotency_key: Option<&str>,
    ) -> Result<Transaction, LedgerError> {
        let delta = match kind {
            TransactionKind::Credit => amount.value(),
            TransactionKind::Debit => -amount.value(),
        };

        let balance_after: Decimal = sqlx::query_scalar(
            r#"
            UPDATE panel."user"
            SET balance = balance + $2, updated_at = NOW()
            WHERE id = $1
            RETURNING balance
            "#,
        )
        .bind(user_id.as_i32())
        .bind(delta)
        .fetch_one(&mut **tx)
        .await?;

        let row = sqlx::query_as::<_, TransactionRow>(
            r"
            INSERT INTO panel.transaction
                (user_id, kind, amount, balance_after, reference, idempotency_key)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, user_id, kind, amount, balance_after, reference,
                      idempotency_key, created_at
            ",
        )
        .bind(user_id.as_i32())
        .bind(kind)
        .bind(amount.value())
        .bind(balance_after)
        .bind(reference)
        .bind(idempotency_key)
        .fetch_one(&mut **tx)
        .await?;

        Ok(Transaction::try_from(row)?)
    }
}

/// Lock the user's row and return the current balance.
async fn lock_balance(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    user_id: UserId,
) -> Result<Decimal, LedgerError> {
    let balance: Option<Decimal> = sqlx::query_scalar(
        r#"
        SELECT balance FROM panel."user"
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(user_id.as_i32())
    .fetch_optional(&mut **tx)
    .await?;

    balance.ok_or(LedgerError::UserNotFound(user_id))
}

#[async_trait]
impl Ledger for LedgerRepository {
    async fn credit(
        &self,
        user_id: UserId,
        amount: Amount,
        reference: &str,
    ) -> Result<Transaction, LedgerError> {
        let mut tx = self.pool.begin().await?;
        lock_balance(&mut tx, user_id).await?;
        let entry = Self::apply(
            &mut tx,
            user_id,
            TransactionKind::Credit,
            amount,
            reference,
            None,
        )
        .await?;
        tx.commit().await?;
        Ok(entry)
    }

    async fn credit_once(
        &self,
        user_id: UserId,
        amount: Amount,
        reference: &str,
        idempotency_key: &str,
    ) -> Result<CreditOutcome, LedgerError> {
        let mut tx = self.pool.begin().await?;
        lock_balance(&mut tx, user_id).await?;

        let seen: bool = sqlx::query_scalar(
            r"
            SELECT EXISTS (
                SELECT 1 FROM panel.transaction WHERE idempotency_key = $1
            )
            ",
        )
        .bind(idempotency_key)
        .fetch_one(&mut *tx)
        .await?;

        if seen {
            tx.rollback().await?;
            return Ok(CreditOutcome::Duplicate);
        }

        let applied = Self::apply(
            &mut tx,
            user_id,
            TransactionKind::Credit,
            amount,
            reference,
            Some(idempotency_key),
        )
        .await;

        match applied {
            Ok(entry) => {
                tx.commit().await?;
                Ok(CreditOutcome::Applied(entry))
            }
            // Another user's row lock does not cover this key; the unique
            // index is the final word.
            Err(LedgerError::Repository(RepositoryError::Database(ref e)))
                if is_unique_violation(e) =>
            {
                tx.rollback().await?;
                Ok(CreditOutcome::Duplicate)
            }
            Err(e) => Err(e),
        }
    }

    async fn debit(
        &self,
        user_id: UserId,
        amount: Amount,
        reference: &str,
    ) -> Result<Transaction, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let balance = lock_balance(&mut tx, user_id).await?;

        if amount.value() > balance {
            tx.rollback().await?;
            return Err(LedgerError::InsufficientFunds {
                balance,
                requested: amount,
            });
        }

        let entry = Self::apply(
            &mut tx,
            user_id,
            TransactionKind::Debit,
            amount,
            reference,
            None,
        )
        .await?;
        tx.commit().await?;
        Ok(entry)
    }

    async fn balance(&self, user_id: UserId) -> Result<Decimal, LedgerError> {
        let balance: Option<Decimal> =
            sqlx::query_scalar(r#"SELECT balance FROM panel."user" WHERE id = $1"#)
                .bind(user_id.as_i32())
                .fetch_optional(&self.pool)
                .await?;

        balance.ok_or(LedgerError::UserNotFound(user_id))
    }

    async fn recent_transactions(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<Transaction>, LedgerError> {
        let rows = sqlx::query_as::<_, TransactionRow>(
            r"
            SELECT id, user_id, kind, amount, balance_after, reference,
                   idempotency_key, created_at
            FROM panel.transaction
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            ",
        )
        .bind(user_id.as_i32())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| Transaction::try_from(row).map_err(LedgerError::from))
            .collect()
    }
}
