//! Payment staging records.
//!
//! A staging record ("payment bin") tracks one mobile-money attempt from the
//! moment the push request is sent until the gateway reports the outcome.
//! Records are disposable: they stop being visible [`PAYMENT_BIN_TTL_HOURS`]
//! after creation whatever their status, and a periodic sweep deletes them.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use spoti_boost_core::{Email, Msisdn, PaymentOrderId, PaymentStatus};

/// How long a staging record lives after creation, in hours.
pub const PAYMENT_BIN_TTL_HOURS: i64 = 24;

/// [`PAYMENT_BIN_TTL_HOURS`] as a duration.
#[must_use]
pub fn payment_bin_ttl() -> Duration {
    Duration::hours(PAYMENT_BIN_TTL_HOURS)
}

/// A staged payment attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentRecord {
    pub order_id: PaymentOrderId,
    /// Email of the paying account; used to find the user to credit.
    pub email: Email,
    pub phone: Msisdn,
    pub status: PaymentStatus,
    /// Gateway-assigned reference, known once a webhook arrives.
    pub reference: Option<String>,
    /// Free-form context, e.g. `{"gateway": "ZenoPay", "amount": "1000"}`.
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentRecord {
    /// Whether the record is older than `ttl` at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.created_at >= ttl
    }

    /// The amount the user asked for when the push request was sent.
    ///
    /// Only a hint for manual follow-up; credits use the amount the gateway
    /// confirms.
    #[must_use]
    pub fn requested_amount(&self) -> Option<&str> {
        self.metadata.get("amount").and_then(serde_json::Value::as_str)
    }
}

/// Input for creating a staging record. New records always start `PENDING`.
#[derive(Debug, Clone)]
pub struct NewPaymentRecord {
    pub order_id: PaymentOrderId,
    pub email: Email,
    pub phone: Msisdn,
    pub metadata: serde_json::Value,
}

/// Fields a webhook may change. `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymentUpdate {
    pub status: Option<PaymentStatus>,
    pub reference: Option<String>,
}
