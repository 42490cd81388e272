//! ZenoPay client errors.

use thiserror::Error;

/// Errors that can occur when talking to the ZenoPay API.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// The request did not finish within its timeout.
    #[error("gateway request timed out")]
    Timeout,

    /// The gateway could not be reached (DNS, connect, TLS, reset).
    #[error("gateway unreachable: {0}")]
    Unreachable(String),

    /// The gateway answered but refused the request.
    #[error("gateway rejected the request: {message}")]
    Rejected {
        /// HTTP status, when the rejection came as a non-2xx response.
        status: Option<u16>,
        /// Message from the gateway, or a generic one if it sent none.
        message: String,
    },

    /// The response body did not have the expected shape.
    #[error("failed to decode gateway response: {0}")]
    Decode(String),

    /// The client could not be configured.
    #[error("invalid gateway configuration: {0}")]
    Config(String),
}

impl GatewayError {
    /// Whether trying again later may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::Unreachable(_))
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else if err.is_builder() {
            Self::Config(err.to_string())
        } else {
            Self::Unreachable(err.to_string())
        }
    }
}
