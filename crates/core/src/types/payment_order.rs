//! Payment order ids sent to the gateway.
//!
//! An id looks like `SPOTIORD-MH243OKD-345678`: a fixed tag, the creation
//! time in milliseconds as upper-case base 36, and a short caller-chosen
//! discriminator (the last digits of the payer's phone). The id is readable
//! on a support call, but uniqueness is only guaranteed by the staging
//! store's unique constraint.

use core::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tag prefixed to every order id issued by the panel.
pub const DEFAULT_ORDER_PREFIX: &str = "SPOTIORD";

const DELIMITER: char = '-';

/// Gateway-facing identifier of one payment attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentOrderId(String);

impl PaymentOrderId {
    /// Build a new id from its parts.
    ///
    /// ```
    /// use chrono::{TimeZone, Utc};
    /// use spoti_boost_core::PaymentOrderId;
    ///
    /// let at = Utc.timestamp_millis_opt(1_761_144_847_000).unwrap();
    /// let id = PaymentOrderId::generate("SPOTIORD", at, "345678");
    /// assert!(id.as_str().starts_with("SPOTIORD-"));
    /// assert!(id.as_str().ends_with("-345678"));
    /// ```
    #[must_use]
    pub fn generate(prefix: &str, at: DateTime<Utc>, discriminator: &str) -> Self {
        let millis = u64::try_from(at.timestamp_millis()).unwrap_or_default();
        Self(format!(
            "{prefix}{DELIMITER}{}{DELIMITER}{discriminator}",
            to_base36(millis)
        ))
    }

    /// Wrap an id received from the gateway or read from storage.
    ///
    /// Returns `None` for blank input.
    #[must_use]
    pub fn from_external(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        (!trimmed.is_empty()).then(|| Self(trimmed.to_owned()))
    }

    /// The id as sent over the wire.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PaymentOrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PaymentOrderId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

    if n == 0 {
        return "0".to_owned();
    }

    let mut out = Vec::new();
    while n > 0 {
        let digit = usize::try_from(n % 36).unwrap_or_default();
        out.push(DIGITS.get(digit).copied().unwrap_or(b'0'));
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_base36() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "Z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(to_base36(1_296), "100");
    }

    #[test]
    fn test_generate_layout() {
        let at = Utc.timestamp_millis_opt(36 * 36).unwrap();
        let id = PaymentOrderId::generate(DEFAULT_ORDER_PREFIX, at, "345678");
        assert_eq!(id.as_str(), "SPOTIORD-100-345678");
    }

    #[test]
    fn test_generate_differs_by_time_and_discriminator() {
        let at = Utc.timestamp_millis_opt(1_761_144_847_000).unwrap();
        let later = Utc.timestamp_millis_opt(1_761_144_847_001).unwrap();
        let a = PaymentOrderId::generate(DEFAULT_ORDER_PREFIX, at, "345678");
        let b = PaymentOrderId::generate(DEFAULT_ORDER_PREFIX, later, "345678");
        let c = PaymentOrderId::generate(DEFAULT_ORDER_PREFIX, at, "111111");
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_from_external_rejects_blank() {
        assert!(PaymentOrderId::from_external("   ").is_none());
        assert_eq!(
            PaymentOrderId::from_external(" SPOTIORD-ABC123-345678 ")
                .unwrap()
                .as_str(),
            "SPOTIORD-ABC123-345678"
        );
    }
}
