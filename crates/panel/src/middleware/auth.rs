//! Authentication extractors.
//!
//! Sign-in itself is handled by the panel's account pages; these extractors
//! only read the identity they leave in the session.

use axum::{
    extract::FromRequestParts,
    http::{HeaderValue, StatusCode, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;

use crate::models::{CurrentUser, session::keys};

/// Where signed-out users are sent.
pub const LOGIN_PATH: &str = "/login";

/// Extractor that requires a signed-in user.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(
///     RequireAuth(user): RequireAuth,
/// ) -> impl IntoResponse {
///     format!("Hello, {}!", user.email)
/// }
/// ```
pub struct RequireAuth(pub CurrentUser);

/// Error returned when authentication is required but the user is not logged in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRejection {
    /// Redirect to login page (for full-page requests).
    RedirectToLogin,
    /// Unauthorized response; HTMX clients are told where to go via `HX-Redirect`.
    Unauthorized,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::RedirectToLogin => Redirect::to(LOGIN_PATH).into_response(),
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                [("hx-redirect", HeaderValue::from_static(LOGIN_PATH))],
            )
                .into_response(),
        }
    }
}

/// Payment endpoints and HTMX swaps cannot follow a redirect into a page.
fn wants_fragment(parts: &Parts) -> bool {
    parts.headers.contains_key("hx-request") || parts.uri.path().starts_with("/zeno/")
}

impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Get the session from extensions (set by SessionManagerLayer)
        let session = parts
            .extensions
            .get::<Session>()
            .ok_or(AuthRejection::Unauthorized)?;

        let user: Option<CurrentUser> = match session.get(keys::CURRENT_USER).await {
            Ok(user) => user,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read session user");
                None
            }
        };

        user.map(Self).ok_or_else(|| {
            if wants_fragment(parts) {
                AuthRejection::Unauthorized
            } else {
                AuthRejection::RedirectToLogin
            }
        })
    }
}
