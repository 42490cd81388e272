//! User domain types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use spoti_boost_core::{Email, UserId};

/// A panel account together with its current balance.
#[derive(Debug, Clone)]
pub struct UserAccount {
    /// Unique user ID.
    pub id: UserId,
    /// Lower-cased email address, unique across accounts.
    pub email: Email,
    /// Display name.
    pub name: String,
    /// Current balance in TZS. Never negative.
    pub balance: Decimal,
    /// When the user was created.
    pub created_at: DateTime<Utc>,
}
