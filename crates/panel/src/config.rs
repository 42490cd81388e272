//! Panel configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `PANEL_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `PANEL_DOMAIN` - Public host name, used to build the webhook URL
//! - `ZENOPAY_API_KEY` - ZenoPay API key (falls back to `ZENO_API_KEY`)
//!
//! ## Optional
//! - `PANEL_HOST` - Bind address (default: 127.0.0.1)
//! - `PANEL_PORT` - Listen port (default: 3000)
//! - `ZENOPAY_PAY_URL` - Push-payment endpoint
//! - `ZENOPAY_STATUS_URL` - Order-status endpoint
//! - `ZENOPAY_INITIATE_TIMEOUT_SECS` - Push request timeout (default: 90)
//! - `ZENOPAY_STATUS_TIMEOUT_SECS` - Status query timeout (default: 120)
//! - `PAYMENT_MIN_AMOUNT` - Smallest accepted top-up in TZS (default: 500)
//! - `PAYMENT_COUNTRY_CODE` - Calling code for phone numbers (default: 255)
//! - `PAYMENT_BIN_SWEEP_SECS` - Interval between staging purges (default: 3600)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use secrecy::SecretString;
use thiserror::Error;
use url::Url;

use spoti_boost_core::{DEFAULT_COUNTRY_CODE, DEFAULT_ORDER_PREFIX};

use crate::zenopay::{DEFAULT_PAY_URL, DEFAULT_STATUS_URL};

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Path the gateway posts payment notifications to.
pub const WEBHOOK_PATH: &str = "/zeno/zenopay-webhook";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Panel application configuration.
#[derive(Debug, Clone)]
pub struct PanelConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public host name (no scheme)
    pub domain: String,
    /// ZenoPay API configuration
    pub zenopay: ZenoPayConfig,
    /// Top-up rules
    pub payments: PaymentConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name (e.g. "production")
    pub sentry_environment: Option<String>,
}

/// ZenoPay API configuration.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct ZenoPayConfig {
    /// API key sent as `x-api-key`
    pub api_key: SecretString,
    /// Push-payment endpoint
    pub pay_url: String,
    /// Order-status endpoint
    pub status_url: String,
    /// Timeout for push requests
    pub initiate_timeout: Duration,
    /// Timeout for status queries
    pub status_timeout: Duration,
}

impl std::fmt::Debug for ZenoPayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZenoPayConfig")
            .field("api_key", &"[REDACTED]")
            .field("pay_url", &self.pay_url)
            .field("status_url", &self.status_url)
            .field("initiate_timeout", &self.initiate_timeout)
            .field("status_timeout", &self.status_timeout)
            .finish()
    }
}

/// Top-up rules.
#[derive(Debug, Clone)]
pub struct PaymentConfig {
    /// Smallest accepted top-up, inclusive
    pub min_amount: Decimal,
    /// Calling code used to normalize phone numbers (digits only)
    pub country_code: String,
    /// Tag at the start of every generated order id
    pub order_prefix: String,
    /// Absolute URL the gateway should notify
    pub webhook_url: String,
    /// Interval between purges of expired staging records
    pub bin_sweep_interval: Duration,
}

impl PaymentConfig {
    /// Build payment settings for a public domain with default rules.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if `domain` is not a valid host.
    pub fn for_domain(domain: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            min_amount: Decimal::from(500),
            country_code: DEFAULT_COUNTRY_CODE.to_owned(),
            order_prefix: DEFAULT_ORDER_PREFIX.to_owned(),
            webhook_url: webhook_url(domain)?,
            bin_sweep_interval: Duration::from_secs(3600),
        })
    }
}

impl PanelConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("PANEL_DATABASE_URL")?;
        let host: IpAddr = parse_env_or_default("PANEL_HOST", "127.0.0.1")?;
        let port: u16 = parse_env_or_default("PANEL_PORT", "3000")?;
        let domain = get_required_env("PANEL_DOMAIN")?;

        let zenopay = ZenoPayConfig::from_env()?;
        let payments = PaymentConfig::from_env(&domain)?;

        Ok(Self {
            database_url,
            host,
            port,
            domain,
            zenopay,
            payments,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether the panel is served from a development host over plain HTTP.
    #[must_use]
    pub fn is_local(&self) -> bool {
        let host = self.domain.split(':').next().unwrap_or_default();
        matches!(host, "localhost" | "127.0.0.1")
    }
}

impl ZenoPayConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let api_key = get_validated_secret_with_fallback("ZENOPAY_API_KEY", "ZENO_API_KEY")?;

        Ok(Self {
            api_key,
            pay_url: get_env_or_default("ZENOPAY_PAY_URL", DEFAULT_PAY_URL),
            status_url: get_env_or_default("ZENOPAY_STATUS_URL", DEFAULT_STATUS_URL),
            initiate_timeout: Duration::from_secs(parse_env_or_default(
                "ZENOPAY_INITIATE_TIMEOUT_SECS",
                "90",
            )?),
            status_timeout: Duration::from_secs(parse_env_or_default(
                "ZENOPAY_STATUS_TIMEOUT_SECS",
                "120",
            )?),
        })
    }
}

impl PaymentConfig {
    fn from_env(domain: &str) -> Result<Self, ConfigError> {
        let min_amount: Decimal = parse_env_or_default("PAYMENT_MIN_AMOUNT", "500")?;
        if min_amount <= Decimal::ZERO {
            return Err(ConfigError::InvalidEnvVar(
                "PAYMENT_MIN_AMOUNT".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        let country_code = get_env_or_default("PAYMENT_COUNTRY_CODE", DEFAULT_COUNTRY_CODE);
        validate_country_code(&country_code)?;

        let sweep_secs: u64 = parse_env_or_default("PAYMENT_BIN_SWEEP_SECS", "3600")?;
        if sweep_secs == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "PAYMENT_BIN_SWEEP_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            min_amount,
            country_code,
            order_prefix: DEFAULT_ORDER_PREFIX.to_owned(),
            webhook_url: webhook_url(domain)?,
            bin_sweep_interval: Duration::from_secs(sweep_secs),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL` (used by Fly.io postgres attach).
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    // Try primary key first (e.g., PANEL_DATABASE_URL)
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    // Fallback to generic DATABASE_URL (set by Fly.io postgres attach)
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable, using `default` when it is unset.
fn parse_env_or_default<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Build the absolute webhook URL for a public domain.
fn webhook_url(domain: &str) -> Result<String, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidEnvVar("PANEL_DOMAIN".to_string(), reason);

    let base = Url::parse(&format!("https://{}/", domain.trim().trim_end_matches('/')))
        .map_err(|e| invalid(e.to_string()))?;
    if base.host_str().is_none_or(str::is_empty) || base.path() != "/" {
        return Err(invalid("expected a bare host name such as panel.example.com".to_string()));
    }

    let url = base.join(WEBHOOK_PATH).map_err(|e| invalid(e.to_string()))?;
    Ok(url.to_string())
}

/// Calling codes are one to three digits.
fn validate_country_code(code: &str) -> Result<(), ConfigError> {
    if (1..=3).contains(&code.len()) && code.bytes().all(|b| b.is_ascii_digit()) {
        return Ok(());
    }
    Err(ConfigError::InvalidEnvVar(
        "PAYMENT_COUNTRY_CODE".to_string(),
        format!("expected 1-3 digits without '+', got '{code}'"),
    ))
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use the key issued by the provider."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret, accepting a legacy variable name.
fn get_validated_secret_with_fallback(
    key: &str,
    legacy_key: &str,
) -> Result<SecretString, ConfigError> {
    let (name, value) = match std::env::var(key) {
        Ok(value) => (key, value),
        Err(_) => (
            legacy_key,
            std::env::var(legacy_key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))?,
        ),
    };
    validate_secret_strength(&value, name)?;
    Ok(SecretString::from(value))
}
