//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. Route handlers that return plain responses use
//! `Result<T, AppError>`; the HTMX payment form renders its own error
//! fragments instead.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::db::LedgerError;

/// Application-level error type for the panel.
#[derive(Debug, Error)]
pub enum AppError {
    /// Ledger operation failed.
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

impl AppError {
    const fn status(&self) -> StatusCode {
        match self {
            Self::Ledger(LedgerError::UserNotFound(_)) => StatusCode::NOT_FOUND,
            Self::Ledger(LedgerError::InsufficientFunds { .. }) => StatusCode::CONFLICT,
            Self::Ledger(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        // Don't expose internal error details to clients
        let message = match &self {
            Self::Ledger(LedgerError::UserNotFound(_)) => "Account not found",
            Self::Ledger(LedgerError::InsufficientFunds { .. }) => "Insufficient balance",
            Self::Ledger(_) => "Internal server error",
        };

        (status, message).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context for the signed-in account.
///
/// Call this once a handler has resolved the session user, so errors raised
/// while serving the request are associated with them.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}
