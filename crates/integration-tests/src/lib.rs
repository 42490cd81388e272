//! Integration tests for the Spoti Boost panel.
//!
//! # Running Tests
//!
//! ```bash
//! # In-process tests (no database or network needed)
//! cargo test -p spoti-boost-integration-tests
//!
//! # Smoke tests against a running panel
//! PANEL_BASE_URL=http://localhost:3000 cargo test -p spoti-boost-integration-tests -- --ignored
//! ```
//!
//! The in-process tests wire the real reconciliation service and router to
//! the in-memory stores and a [`ScriptedGateway`] standing in for ZenoPay.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use rust_decimal::Decimal;
use secrecy::SecretString;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::Mutex;

use spoti_boost_core::{Email, PaymentOrderId};
use spoti_boost_panel::config::{PanelConfig, PaymentConfig, ZenoPayConfig};
use spoti_boost_panel::db::memory::{MemoryLedger, MemoryPaymentBins};
use spoti_boost_panel::models::UserAccount;
use spoti_boost_panel::routes;
use spoti_boost_panel::services::{ReconciliationService, TopUpRequest};
use spoti_boost_panel::state::AppState;
use spoti_boost_panel::zenopay::{
    DEFAULT_PAY_URL, DEFAULT_STATUS_URL, GatewayError, InitiatePayment, InitiateResponse,
    OrderStatus, PaymentGateway, RawAmount, WebhookPayload,
};

/// Public domain used by every test configuration.
pub const TEST_DOMAIN: &str = "panel.example.co.tz";

/// Email of the account created by [`TestContext::with_user`].
pub const TEST_EMAIL: &str = "mteja@example.com";

/// How the fake gateway answers push requests.
#[derive(Debug, Clone)]
pub enum InitiateScript {
    Accept,
    Fail(GatewayError),
}

/// A stand-in for ZenoPay that answers from a script and records calls.
#[derive(Debug)]
pub struct ScriptedGateway {
    initiate: InitiateScript,
    status: Result<OrderStatus, GatewayError>,
    status_delay: Duration,
    initiated: Mutex<Vec<InitiatePayment>>,
    status_queries: AtomicUsize,
}

impl ScriptedGateway {
    /// Accepts every push request and confirms every order as paid for `amount`.
    #[must_use]
    pub fn paying(amount: &str) -> Self {
        Self {
            initiate: InitiateScript::Accept,
            status: Ok(completed_status(amount)),
            status_delay: Duration::ZERO,
            initiated: Mutex::new(Vec::new()),
            status_queries: AtomicUsize::new(0),
        }
    }

    /// Fails every push request with `error`.
    #[must_use]
    pub fn failing(error: GatewayError) -> Self {
        Self {
            initiate: InitiateScript::Fail(error),
            ..Self::paying("0")
        }
    }

    /// Replace the status query answer.
    #[must_use]
    pub fn with_status(mut self, status: Result<OrderStatus, GatewayError>) -> Self {
        self.status = status;
        self
    }

    /// Delay every status query.
    #[must_use]
    pub const fn with_status_delay(mut self, delay: Duration) -> Self {
        self.status_delay = delay;
        self
    }

    /// Push requests received so far.
    pub async fn initiated(&self) -> Vec<InitiatePayment> {
        self.initiated.lock().await.clone()
    }

    /// Number of status queries received so far.
    #[must_use]
    pub fn status_queries(&self) -> usize {
        self.status_queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn initiate(&self, payment: &InitiatePayment) -> Result<InitiateResponse, GatewayError> {
        self.initiated.lock().await.push(payment.clone());
        match &self.initiate {
            InitiateScript::Accept => Ok(InitiateResponse {
                status: "success".to_owned(),
                message: Some("Request in progress. You will receive a callback shortly".to_owned()),
                order_id: Some(payment.order_id.clone()),
                resultcode: Some("000".to_owned()),
            }),
            InitiateScript::Fail(error) => Err(error.clone()),
        }
    }

    async fn query_status(&self, _order_id: &PaymentOrderId) -> Result<OrderStatus, GatewayError> {
        self.status_queries.fetch_add(1, Ordering::SeqCst);
        if !self.status_delay.is_zero() {
            tokio::time::sleep(self.status_delay).await;
        }
        self.status.clone()
    }
}

/// A status answer reporting the order as paid.
#[must_use]
pub fn completed_status(amount: &str) -> OrderStatus {
    OrderStatus {
        payment_status: Some("COMPLETED".to_owned()),
        amount: Some(RawAmount::Text(amount.to_owned())),
        reference: Some("REF1".to_owned()),
        channel: Some("MPESA-TZ".to_owned()),
        ..OrderStatus::default()
    }
}

/// A webhook body as the gateway posts it.
#[must_use]
pub fn webhook(order_id: &PaymentOrderId, status: &str, reference: Option<&str>) -> WebhookPayload {
    WebhookPayload {
        order_id: Some(order_id.to_string()),
        payment_status: Some(status.to_owned()),
        reference: reference.map(str::to_owned),
    }
}

/// A top-up request from the test account.
#[must_use]
pub fn top_up(amount: &str, phone9: &str) -> TopUpRequest {
    TopUpRequest {
        email: TEST_EMAIL.to_owned(),
        name: Some("Mteja Mmoja".to_owned()),
        amount: amount.to_owned(),
        phone9: phone9.to_owned(),
    }
}

/// Panel configuration that needs no environment.
///
/// # Panics
///
/// Panics if [`TEST_DOMAIN`] is rejected, which would be a bug in the test setup.
#[must_use]
pub fn test_config() -> PanelConfig {
    PanelConfig {
        database_url: SecretString::from("postgres://localhost/spoti_boost_test"),
        host: std::net::IpAddr::from([127, 0, 0, 1]),
        port: 3000,
        domain: TEST_DOMAIN.to_owned(),
        zenopay: ZenoPayConfig {
            api_key: SecretString::from("zp_Kf83hQ2mLx9vT4wR7yN1"),
            pay_url: DEFAULT_PAY_URL.to_owned(),
            status_url: DEFAULT_STATUS_URL.to_owned(),
            initiate_timeout: Duration::from_secs(90),
            status_timeout: Duration::from_secs(120),
        },
        payments: PaymentConfig::for_domain(TEST_DOMAIN).expect("test domain is valid"),
        sentry_dsn: None,
        sentry_environment: None,
    }
}

/// Service, stores and gateway wired together in memory.
pub struct TestContext {
    pub gateway: Arc<ScriptedGateway>,
    pub bins: MemoryPaymentBins,
    pub ledger: MemoryLedger,
    pub service: Arc<ReconciliationService>,
}

impl TestContext {
    /// Wire a fresh context around `gateway`.
    #[must_use]
    pub fn new(gateway: ScriptedGateway) -> Self {
        let gateway = Arc::new(gateway);
        let bins = MemoryPaymentBins::new();
        let ledger = MemoryLedger::new();
        let service = ReconciliationService::new(
            gateway.clone(),
            Arc::new(bins.clone()),
            Arc::new(ledger.clone()),
            Arc::new(ledger.clone()),
            test_config().payments,
        );

        Self {
            gateway,
            bins,
            ledger,
            service: Arc::new(service),
        }
    }

    /// Register the test account with `balance`.
    ///
    /// # Panics
    ///
    /// Panics if [`TEST_EMAIL`] does not parse.
    pub async fn with_user(&self, balance: i64) -> UserAccount {
        let email = Email::parse(TEST_EMAIL).expect("test email is valid");
        self.ledger
            .insert_user(email, "Mteja Mmoja", Decimal::from(balance))
            .await
    }

    /// The panel router backed by this context.
    ///
    /// The database pool is lazy and never used by the payment routes.
    #[must_use]
    pub fn router(&self) -> Router {
        self.router_with_state().0
    }

    /// The panel router and the state behind it, for tests that need to
    /// drain webhook work.
    ///
    /// # Panics
    ///
    /// Panics if the placeholder database URL does not parse.
    #[must_use]
    pub fn router_with_state(&self) -> (Router, AppState) {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/spoti_boost_test")
            .expect("lazy pool");
        let state = AppState::new(
            test_config(),
            pool,
            self.service.clone(),
            Arc::new(self.ledger.clone()),
        );
        (routes::routes().with_state(state.clone()), state)
    }
}
