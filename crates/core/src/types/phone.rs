//! Mobile number normalization.
//!
//! Mobile-money payments are addressed to an MSISDN in international form
//! (`+255XXXXXXXXX` for Tanzania). Users type numbers in three shapes:
//!
//! | Shape | Example | Length |
//! |---|---|---|
//! | `+<cc>` + 9 digits | `+255712345678` | 13 |
//! | `<cc>` + 9 digits | `255712345678` | 12 |
//! | `0` + 9 digits | `0712345678` | 10 |
//!
//! [`PhoneNormalizer::normalize`] accepts any of them and rejects everything
//! else with a message that names the shape the user attempted and the
//! length it requires.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Number of subscriber digits after the country code or trunk prefix.
pub const SUBSCRIBER_DIGITS: usize = 9;

/// Tanzania's international calling code.
pub const DEFAULT_COUNTRY_CODE: &str = "255";

/// Which input shape a number was written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhoneFormat {
    /// `+<cc>` followed by the subscriber number.
    International,
    /// `<cc>` followed by the subscriber number, without the plus.
    CountryCode,
    /// `0` trunk prefix followed by the subscriber number.
    Local,
}

/// Why a phone number was rejected.
///
/// The `Display` output is shown to the user as-is.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PhoneError {
    /// Nothing was entered.
    #[error("a phone number is required")]
    Empty,
    /// The number starts like a known shape but has the wrong length or
    /// contains non-digits.
    #[error("a {prefix} number must be {required} characters")]
    BadLength {
        /// The prefix that was recognised (`+255`, `255` or `0`).
        prefix: String,
        /// Total characters the shape requires.
        required: usize,
    },
    /// The subscriber part typed into the 9-digit field is malformed.
    #[error("enter {digits} digits without a leading 0")]
    BadSubscriber {
        /// Required number of digits.
        digits: usize,
    },
    /// The number does not start with any accepted prefix.
    #[error("use a number starting with +{country_code}, {country_code} or 0")]
    UnknownFormat {
        /// The configured country code.
        country_code: String,
    },
}

/// A normalized mobile number (`+<cc>` followed by nine digits).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Msisdn(String);

impl Msisdn {
    /// The canonical `+<cc>XXXXXXXXX` form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The same number without the leading plus, as gateways expect it.
    #[must_use]
    pub fn digits(&self) -> &str {
        self.0.trim_start_matches('+')
    }

    /// The last `n` digits of the subscriber number.
    #[must_use]
    pub fn last_digits(&self, n: usize) -> &str {
        let digits = self.digits();
        let start = digits.len().saturating_sub(n);
        digits.get(start..).unwrap_or(digits)
    }

    /// Wrap a value read back from storage without revalidating it.
    #[must_use]
    pub const fn from_trusted(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for Msisdn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Msisdn {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Normalizes phone numbers for one national numbering plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneNormalizer {
    country_code: String,
}

impl Default for PhoneNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_COUNTRY_CODE)
    }
}

impl PhoneNormalizer {
    /// Create a normalizer for the given calling code (digits only, no plus).
    #[must_use]
    pub fn new(country_code: impl Into<String>) -> Self {
        Self {
            country_code: country_code.into(),
        }
    }

    /// The configured calling code.
    #[must_use]
    pub fn country_code(&self) -> &str {
        &self.country_code
    }

    /// Normalize a number typed in any of the accepted shapes.
    ///
    /// Spaces and dashes are ignored.
    ///
    /// # Errors
    ///
    /// Returns a [`PhoneError`] describing what the user should fix.
    ///
    /// # Example
    ///
    /// ```
    /// use spoti_boost_core::PhoneNormalizer;
    ///
    /// let tz = PhoneNormalizer::default();
    /// assert_eq!(tz.normalize("0712 345 678").unwrap().as_str(), "+255712345678");
    /// assert_eq!(
    ///     tz.normalize("25571234567").unwrap_err().to_string(),
    ///     "a 255 number must be 12 characters"
    /// );
    /// ```
    pub fn normalize(&self, raw: &str) -> Result<Msisdn, PhoneError> {
        self.classify(raw).map(|(_, msisdn)| msisdn)
    }

    /// Like [`normalize`](Self::normalize) but also reports the shape that
    /// matched.
    ///
    /// # Errors
    ///
    /// Returns a [`PhoneError`] describing what the user should fix.
    pub fn classify(&self, raw: &str) -> Result<(PhoneFormat, Msisdn), PhoneError> {
        let phone: String = raw
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-')
            .collect();

        if phone.is_empty() {
            return Err(PhoneError::Empty);
        }

        let cc = self.country_code.as_str();
        let plus_prefix = format!("+{cc}");

        if let Some(rest) = phone.strip_prefix(&plus_prefix) {
            return self
                .subscriber(rest)
                .map(|msisdn| (PhoneFormat::International, msisdn))
                .ok_or_else(|| PhoneError::BadLength {
                    required: plus_prefix.len() + SUBSCRIBER_DIGITS,
                    prefix: plus_prefix.clone(),
                });
        }

        if let Some(rest) = phone.strip_prefix(cc) {
            return self
                .subscriber(rest)
                .map(|msisdn| (PhoneFormat::CountryCode, msisdn))
                .ok_or_else(|| PhoneError::BadLength {
                    prefix: cc.to_owned(),
                    required: cc.len() + SUBSCRIBER_DIGITS,
                });
        }

        if let Some(rest) = phone.strip_prefix('0') {
            return self
                .subscriber(rest)
                .map(|msisdn| (PhoneFormat::Local, msisdn))
                .ok_or_else(|| PhoneError::BadLength {
                    prefix: "0".to_owned(),
                    required: 1 + SUBSCRIBER_DIGITS,
                });
        }

        Err(PhoneError::UnknownFormat {
            country_code: self.country_code.clone(),
        })
    }

    /// Build a number from the nine subscriber digits typed into the top-up
    /// form (no trunk zero, no country code).
    ///
    /// # Errors
    ///
    /// Returns `PhoneError::BadSubscriber` unless the input is exactly nine
    /// digits with a non-zero first digit.
    pub fn from_subscriber(&self, phone9: &str) -> Result<Msisdn, PhoneError> {
        let phone9 = phone9.trim();
        if phone9.starts_with('0') {
            return Err(PhoneError::BadSubscriber {
                digits: SUBSCRIBER_DIGITS,
            });
        }
        self.subscriber(phone9).ok_or(PhoneError::BadSubscriber {
            digits: SUBSCRIBER_DIGITS,
        })
    }

    fn subscriber(&self, rest: &str) -> Option<Msisdn> {
        let valid = rest.len() == SUBSCRIBER_DIGITS && rest.bytes().all(|b| b.is_ascii_digit());
        valid.then(|| Msisdn(format!("+{}{rest}", self.country_code)))
    }
}
