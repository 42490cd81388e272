//! Ledger entries.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use spoti_boost_core::{Amount, TransactionId, TransactionKind, UserId};

/// One balance movement. Entries are never updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub user_id: UserId,
    pub kind: TransactionKind,
    pub amount: Amount,
    /// The user's balance immediately after this entry was applied.
    pub balance_after: Decimal,
    /// Human-readable origin, e.g. `ZENO:REF1:SPOTIORD-...` or `ORDER:42`.
    pub reference: Option<String>,
    /// Deduplication key for credits that must apply at most once.
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
}
