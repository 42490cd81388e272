//! ZenoPay top-up route handlers.
//!
//! `POST /zeno/pay` is driven by an HTMX form and always answers with a
//! fragment. `POST /zeno/zenopay-webhook` acknowledges at once and reconciles
//! on a background task, so a slow status query never delays the gateway.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sentry::SentryFutureExt;
use serde::Deserialize;
use tracing::{Instrument, instrument};

use crate::error::{self, set_sentry_user};
use crate::middleware::RequireAuth;
use crate::models::Transaction;
use crate::services::{InitiatedPayment, TopUpRequest};
use crate::state::AppState;
use crate::zenopay::WebhookPayload;

/// Ledger entries shown under the balance.
const RECENT_TRANSACTIONS: u32 = 10;

/// Top-up form data.
#[derive(Debug, Deserialize)]
pub struct PayForm {
    pub amount: String,
    /// Nine subscriber digits; the country code is shown as a fixed prefix.
    pub phone9: String,
}

/// Push request sent; tells the user to confirm on their handset.
#[derive(Template, WebTemplate)]
#[template(path = "payments/initiated.html")]
pub struct InitiatedTemplate {
    pub order_id: String,
    pub phone: String,
    pub amount: String,
}

impl From<InitiatedPayment> for InitiatedTemplate {
    fn from(payment: InitiatedPayment) -> Self {
        Self {
            order_id: payment.order_id.to_string(),
            phone: payment.phone.to_string(),
            amount: payment.amount.to_string(),
        }
    }
}

/// The gateway or the panel could not start the payment.
#[derive(Template, WebTemplate)]
#[template(path = "payments/error.html")]
pub struct PaymentErrorTemplate {
    pub message: String,
}

/// The form input was rejected; re-renders the form with the typed values.
#[derive(Template, WebTemplate)]
#[template(path = "payments/form_error.html")]
pub struct FormErrorTemplate {
    pub message: String,
    pub amount: String,
    pub phone9: String,
    pub country_code: String,
}

/// One ledger row as displayed.
pub struct TransactionView {
    pub kind: String,
    pub amount: String,
    pub balance_after: String,
    pub reference: String,
    pub created_at: String,
}

impl From<&Transaction> for TransactionView {
    fn from(entry: &Transaction) -> Self {
        Self {
            kind: entry.kind.to_string(),
            amount: entry.amount.to_string(),
            balance_after: entry.balance_after.to_string(),
            reference: entry.reference.clone().unwrap_or_default(),
            created_at: entry.created_at.format("%Y-%m-%d %H:%M").to_string(),
        }
    }
}

/// Balance card with the latest ledger entries.
#[derive(Template, WebTemplate)]
#[template(path = "payments/balance.html")]
pub struct BalanceTemplate {
    pub balance: String,
    pub transactions: Vec<TransactionView>,
}

/// Start a mobile-money top-up (HTMX).
#[instrument(skip(state, user, form), fields(user_id = %user.id))]
pub async fn pay(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Form(form): Form<PayForm>,
) -> Response {
    set_sentry_user(&user.id, Some(user.email.as_str()));

    let request = TopUpRequest {
        email: user.email.to_string(),
        name: user.name.clone(),
        amount: form.amount.clone(),
        phone9: form.phone9.clone(),
    };

    match state.reconciliation().initiate(request).await {
        Ok(payment) => InitiatedTemplate::from(payment).into_response(),
        Err(e) if e.is_validation() => FormErrorTemplate {
            message: e.user_message(),
            amount: form.amount,
            phone9: form.phone9,
            country_code: state.config().payments.country_code.clone(),
        }
        .into_response(),
        Err(e) => {
            if e.is_internal() {
                let event_id = sentry::capture_error(&e);
                tracing::error!(error = %e, sentry_event_id = %event_id, "Top-up failed");
            }
            PaymentErrorTemplate {
                message: e.user_message(),
            }
            .into_response()
        }
    }
}

/// Current balance and recent ledger entries (HTMX).
///
/// # Errors
///
/// Returns `AppError::Ledger` if the ledger cannot be read.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn balance(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> error::Result<BalanceTemplate> {
    let balance = state.ledger().balance(user.id).await?;
    let transactions = state
        .ledger()
        .recent_transactions(user.id, RECENT_TRANSACTIONS)
        .await?;

    Ok(BalanceTemplate {
        balance: balance.to_string(),
        transactions: transactions.iter().map(TransactionView::from).collect(),
    })
}

/// Receive a ZenoPay payment notification.
///
/// Always answers 200: the gateway retries on anything else, and a delivery
/// that cannot be processed will not get better by retrying. Reconciliation
/// runs on a tracked background task, drained on shutdown, and logs its
/// outcome.
pub async fn webhook(State(state): State<AppState>, body: Bytes) -> StatusCode {
    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!(error = %e, bytes = body.len(), "Ignoring unreadable ZenoPay webhook");
            return StatusCode::OK;
        }
    };

    tracing::info!(
        order_id = payload.order_id.as_deref().unwrap_or_default(),
        status = payload.payment_status.as_deref().unwrap_or_default(),
        "ZenoPay webhook received"
    );

    let service = state.reconciliation();
    let task = async move {
        match service.handle_webhook(payload).await {
            Ok(outcome) => outcome.log(),
            Err(e) => {
                let event_id = sentry::capture_error(&e);
                tracing::error!(
                    error = %e,
                    sentry_event_id = %event_id,
                    "ZenoPay webhook reconciliation failed"
                );
            }
        }
    };

    state.background().spawn(
        task.in_current_span()
            .bind_hub(sentry::Hub::new_from_top(sentry::Hub::current())),
    );

    StatusCode::OK
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::{
        Router,
        body::Body,
        http::{Request, header},
    };
    use rust_decimal::Decimal;
    use secrecy::SecretString;
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;

    use spoti_boost_core::{
        Amount, Email, Msisdn, PaymentOrderId, PaymentStatus, TransactionId, TransactionKind,
        UserId,
    };

    use super::*;
    use crate::config::{PanelConfig, PaymentConfig, ZenoPayConfig};
    use crate::db::memory::{MemoryLedger, MemoryPaymentBins};
    use crate::db::{Ledger, PaymentBinStore};
    use crate::models::{NewPaymentRecord, Transaction};
    use crate::services::ReconciliationService;
    use crate::zenopay::{
        DEFAULT_PAY_URL, DEFAULT_STATUS_URL, MockPaymentGateway, OrderStatus, RawAmount,
    };

    const ORDER: &str = "SPOTIORD-MH243OKD-345678";
    const DOMAIN: &str = "panel.example.co.tz";

    struct TestApp {
        router: Router,
        state: AppState,
        bins: MemoryPaymentBins,
        ledger: MemoryLedger,
    }

    fn config() -> PanelConfig {
        PanelConfig {
            database_url: SecretString::from("postgres://localhost/unused"),
            host: "127.0.0.1".parse().unwrap(),
            port: 3000,
            domain: DOMAIN.to_string(),
            zenopay: ZenoPayConfig {
                api_key: SecretString::from("zp_Kf83hQ2mLx9vT4wR7yN1"),
                pay_url: DEFAULT_PAY_URL.to_string(),
                status_url: DEFAULT_STATUS_URL.to_string(),
                initiate_timeout: Duration::from_secs(90),
                status_timeout: Duration::from_secs(120),
            },
            payments: PaymentConfig::for_domain(DOMAIN).unwrap(),
            sentry_dsn: None,
            sentry_environment: None,
        }
    }

    fn app(gateway: MockPaymentGateway) -> TestApp {
        let bins = MemoryPaymentBins::new();
        let ledger = MemoryLedger::new();
        let config = config();
        let service = ReconciliationService::new(
            Arc::new(gateway),
            Arc::new(bins.clone()),
            Arc::new(ledger.clone()),
            Arc::new(ledger.clone()),
            config.payments.clone(),
        );
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        let state = AppState::new(config, pool, Arc::new(service), Arc::new(ledger.clone()));

        TestApp {
            router: crate::routes::routes().with_state(state.clone()),
            state,
            bins,
            ledger,
        }
    }

    async fn stage(bins: &MemoryPaymentBins) {
        bins.create(NewPaymentRecord {
            order_id: PaymentOrderId::from_external(ORDER).unwrap(),
            email: Email::parse("mteja@example.com").unwrap(),
            phone: Msisdn::from_trusted("+255712345678".to_owned()),
            metadata: serde_json::json!({"gateway": "ZenoPay"}),
        })
        .await
        .unwrap();
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_owned()))
            .unwrap()
    }

    fn completed_webhook() -> String {
        format!(r#"{{"order_id":"{ORDER}","payment_status":"COMPLETED","reference":"REF1"}}"#)
    }

    #[tokio::test]
    async fn test_health() {
        let app = app(MockPaymentGateway::new());
        let response = app
            .router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_webhook_acknowledges_non_json_body() {
        let app = app(MockPaymentGateway::new());
        let response = app
            .router
            .oneshot(post_json("/zeno/zenopay-webhook", "order_id=1&status=ok"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(app.bins.stored_count().await, 0);
    }

    #[tokio::test]
    async fn test_webhook_for_unknown_order_leaves_store_untouched() {
        let app = app(MockPaymentGateway::new());
        let response = app
            .router
            .oneshot(post_json("/zeno/zenopay-webhook", &completed_webhook()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(app.bins.stored_count().await, 0);
    }

    #[tokio::test]
    async fn test_webhook_credits_in_background() {
        let mut gateway = MockPaymentGateway::new();
        gateway.expect_query_status().times(1).returning(|_| {
            Ok(OrderStatus {
                payment_status: Some("COMPLETED".to_owned()),
                amount: Some(RawAmount::Text("1000".to_owned())),
                ..OrderStatus::default()
            })
        });
        let app = app(gateway);
        let user = app
            .ledger
            .insert_user(
                Email::parse("mteja@example.com").unwrap(),
                "Mteja",
                Decimal::from(250),
            )
            .await;
        stage(&app.bins).await;

        let response = app
            .router
            .oneshot(post_json("/zeno/zenopay-webhook", &completed_webhook()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let credited = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let balance = app.ledger.balance(user.id).await.unwrap();
                if balance == Decimal::from(1250) {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(credited.is_ok(), "balance was never credited");

        let record = app
            .bins
            .find_by_order_id(&PaymentOrderId::from_external(ORDER).unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, PaymentStatus::Completed);
        assert_eq!(record.reference.as_deref(), Some("REF1"));
    }

    #[tokio::test]
    async fn test_webhook_with_numeric_reference_is_credited() {
        let mut gateway = MockPaymentGateway::new();
        gateway.expect_query_status().times(1).returning(|_| {
            Ok(OrderStatus {
                payment_status: Some("COMPLETED".to_owned()),
                amount: Some(RawAmount::Text("1000".to_owned())),
                ..OrderStatus::default()
            })
        });
        let app = app(gateway);
        let user = app
            .ledger
            .insert_user(Email::parse("mteja@example.com").unwrap(), "Mteja", Decimal::ZERO)
            .await;
        stage(&app.bins).await;

        let body =
            format!(r#"{{"order_id":"{ORDER}","payment_status":"COMPLETED","reference":994780437}}"#);
        let response = app
            .router
            .oneshot(post_json("/zeno/zenopay-webhook", &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        assert!(app.state.drain_background(Duration::from_secs(5)).await);
        assert_eq!(app.ledger.balance(user.id).await.unwrap(), Decimal::from(1000));
        let record = app
            .bins
            .find_by_order_id(&PaymentOrderId::from_external(ORDER).unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.reference.as_deref(), Some("994780437"));
    }

    #[tokio::test]
    async fn test_drain_waits_for_webhook_reconciliation() {
        let mut gateway = MockPaymentGateway::new();
        gateway.expect_query_status().times(1).returning(|_| {
            Ok(OrderStatus {
                payment_status: Some("COMPLETED".to_owned()),
                amount: Some(RawAmount::Text("1000".to_owned())),
                ..OrderStatus::default()
            })
        });
        let app = app(gateway);
        let user = app
            .ledger
            .insert_user(Email::parse("mteja@example.com").unwrap(), "Mteja", Decimal::from(250))
            .await;
        stage(&app.bins).await;

        let response = app
            .router
            .oneshot(post_json("/zeno/zenopay-webhook", &completed_webhook()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // No polling: draining alone must be enough to observe the credit.
        assert!(app.state.drain_background(Duration::from_secs(5)).await);
        assert!(app.state.background().is_empty());
        assert_eq!(app.ledger.balance(user.id).await.unwrap(), Decimal::from(1250));
    }

    #[tokio::test]
    async fn test_pay_without_session_is_unauthorized() {
        let app = app(MockPaymentGateway::new());
        let response = app
            .router
            .oneshot(
                Request::post("/zeno/pay")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from("amount=1000&phone9=712345678"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(app.bins.stored_count().await, 0);
    }

    #[test]
    fn test_form_error_fragment_keeps_typed_values() {
        let html = FormErrorTemplate {
            message: "Amount must be at least TZS 500.".to_string(),
            amount: "100".to_string(),
            phone9: "712345678".to_string(),
            country_code: "255".to_string(),
        }
        .render()
        .unwrap();

        assert!(html.contains("Amount must be at least TZS 500."));
        assert!(html.contains(r#"value="100""#));
        assert!(html.contains(r#"value="712345678""#));
    }

    #[test]
    fn test_initiated_fragment_names_phone_and_order() {
        let html = InitiatedTemplate {
            order_id: ORDER.to_string(),
            phone: "+255712345678".to_string(),
            amount: "1000".to_string(),
        }
        .render()
        .unwrap();

        assert!(html.contains("+255712345678"));
        assert!(html.contains(ORDER));
    }

    #[tokio::test]
    async fn test_balance_without_session_is_unauthorized() {
        let app = app(MockPaymentGateway::new());
        let response = app
            .router
            .oneshot(
                Request::get("/zeno/balance")
                    .header("hx-request", "true")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_balance_fragment_lists_ledger_entries() {
        let entry = Transaction {
            id: TransactionId::new(1),
            user_id: UserId::new(7),
            kind: TransactionKind::Credit,
            amount: Amount::new(Decimal::from(1000)).unwrap(),
            balance_after: Decimal::from(1250),
            reference: Some(format!("ZENO:REF1:{ORDER}")),
            idempotency_key: Some(format!("zenopay:{ORDER}")),
            created_at: chrono::Utc::now(),
        };
        let html = BalanceTemplate {
            balance: "1250".to_string(),
            transactions: vec![TransactionView::from(&entry)],
        }
        .render()
        .unwrap();

        assert!(html.contains("TZS 1250"));
        assert!(html.contains(&format!("ZENO:REF1:{ORDER}")));
        assert!(!html.contains("No transactions yet."));
    }

    #[test]
    fn test_empty_balance_fragment() {
        let html = BalanceTemplate {
            balance: "0".to_string(),
            transactions: Vec::new(),
        }
        .render()
        .unwrap();

        assert!(html.contains("No transactions yet."));
    }
}
