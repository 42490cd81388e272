//! Balance top-ups through ZenoPay.
//!
//! # Flow
//!
//! 1. The user submits an amount and the nine subscriber digits of their
//!    phone. Input is validated before anything is written or sent.
//! 2. A `PENDING` staging record is reserved under a fresh order id, then the
//!    push request goes out. If the gateway fails, times out or refuses, the
//!    reservation is dropped again so a failed attempt leaves nothing behind.
//! 3. The gateway later posts a webhook. The staging record takes the new
//!    status and reference.
//! 4. On `COMPLETED` the order status is fetched again from the gateway, and
//!    the amount it reports is credited to the account that owns the
//!    record's email. The ledger deduplicates on the order id, so repeated
//!    or concurrent deliveries credit once.
//!
//! Nothing in the webhook path is surfaced to the gateway: the route
//! acknowledges immediately and the [`WebhookOutcome`] is only logged.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use thiserror::Error;
use tracing::instrument;

use spoti_boost_core::{
    Amount, AmountError, Email, EmailError, Msisdn, PaymentOrderId, PaymentStatus, PhoneError,
    PhoneNormalizer,
};

use crate::config::PaymentConfig;
use crate::db::{
    CreditOutcome, Ledger, LedgerError, PaymentBinStore, RepositoryError, StoreError,
    UserDirectory,
};
use crate::models::{NewPaymentRecord, PaymentRecord, PaymentUpdate, Transaction};
use crate::zenopay::{GatewayError, InitiatePayment, PaymentGateway, WebhookPayload};

/// Gateway name stored in staging metadata.
const GATEWAY_NAME: &str = "ZenoPay";

/// Longest payer name the gateway accepts.
const MAX_BUYER_NAME_CHARS: usize = 60;

/// Phone digits appended to generated order ids.
const ORDER_ID_PHONE_DIGITS: usize = 6;

/// A top-up request as submitted by a signed-in user.
#[derive(Debug, Clone)]
pub struct TopUpRequest {
    /// Email of the signed-in account.
    pub email: String,
    /// Display name, if the account has one.
    pub name: Option<String>,
    /// Amount as typed into the form.
    pub amount: String,
    /// Nine subscriber digits, without country code or leading zero.
    pub phone9: String,
}

/// A push request the gateway accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitiatedPayment {
    pub order_id: PaymentOrderId,
    pub phone: Msisdn,
    pub amount: Amount,
}

/// Input that was rejected before any side effect.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid email: {0}")]
    Email(#[from] EmailError),

    #[error("amount must be at least {minimum}")]
    Amount { minimum: Decimal },

    #[error("invalid phone number: {0}")]
    Phone(#[from] PhoneError),
}

/// Why a top-up could not be started.
#[derive(Debug, Error)]
pub enum InitiationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("gateway timed out")]
    GatewayTimeout,

    #[error("gateway rejected the payment: {0}")]
    GatewayRejected(String),

    #[error("gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("order id already in use: {0}")]
    DuplicateOrder(PaymentOrderId),

    #[error("staging store error: {0}")]
    Store(#[from] RepositoryError),
}

impl From<GatewayError> for InitiationError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Timeout => Self::GatewayTimeout,
            GatewayError::Rejected { message, .. } => Self::GatewayRejected(message),
            GatewayError::Unreachable(message)
            | GatewayError::Decode(message)
            | GatewayError::Config(message) => Self::GatewayUnavailable(message),
        }
    }
}

impl From<StoreError> for InitiationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateOrder(order_id) => Self::DuplicateOrder(order_id),
            StoreError::Repository(e) => Self::Store(e),
        }
    }
}

impl InitiationError {
    /// Text shown to the user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(ValidationError::Email(_)) => {
                "Your account email is invalid. Please sign in again.".to_owned()
            }
            Self::Validation(ValidationError::Amount { minimum }) => {
                format!("Amount must be at least TZS {minimum}.")
            }
            Self::Validation(ValidationError::Phone(e)) => format!("Invalid phone number: {e}."),
            Self::GatewayTimeout => {
                "The payment service took too long to respond. Please try again.".to_owned()
            }
            Self::GatewayRejected(message) => message.clone(),
            Self::GatewayUnavailable(_) => {
                "The payment service is unavailable right now. Please try again later.".to_owned()
            }
            Self::DuplicateOrder(_) | Self::Store(_) => {
                "Something went wrong starting your payment. Please try again.".to_owned()
            }
        }
    }

    /// Whether the user should correct the form rather than retry.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Whether this is our fault rather than the user's or the gateway's.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::DuplicateOrder(_) | Self::Store(_))
    }
}

/// Why a completed payment was not credited.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CreditSkip {
    #[error("status query failed: {0}")]
    StatusUnavailable(GatewayError),

    #[error("gateway reports {0}, not COMPLETED")]
    NotConfirmed(String),

    #[error("unusable amount: {0}")]
    AmountUnparseable(AmountError),

    #[error("no account for {0}")]
    UserNotFound(Email),
}

/// What a webhook delivery did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// The body carried no order id.
    MissingOrderId,
    /// No live staging record has this order id.
    UnknownOrder(PaymentOrderId),
    /// The record was updated; nothing to credit.
    Recorded {
        order_id: PaymentOrderId,
        status: PaymentStatus,
    },
    /// The balance was credited.
    Credited {
        order_id: PaymentOrderId,
        transaction: Transaction,
    },
    /// This order was credited by an earlier delivery.
    AlreadyCredited { order_id: PaymentOrderId },
    /// The payment completed but could not be credited.
    CreditSkipped {
        order_id: PaymentOrderId,
        reason: CreditSkip,
    },
}

impl WebhookOutcome {
    /// Write the outcome to the log at a level matching its urgency.
    pub fn log(&self) {
        match self {
            Self::MissingOrderId => tracing::warn!("ZenoPay webhook without order_id ignored"),
            Self::UnknownOrder(order_id) => {
                tracing::warn!(order_id = %order_id, "ZenoPay webhook for unknown order ignored");
            }
            Self::Recorded { order_id, status } => {
                tracing::info!(order_id = %order_id, status = %status, "Payment status recorded");
            }
            Self::Credited {
                order_id,
                transaction,
            } => tracing::info!(
                order_id = %order_id,
                user_id = %transaction.user_id,
                amount = %transaction.amount,
                balance_after = %transaction.balance_after,
                "Balance credited"
            ),
            Self::AlreadyCredited { order_id } => {
                tracing::info!(order_id = %order_id, "Duplicate completion ignored");
            }
            Self::CreditSkipped {
                order_id,
                reason: reason @ CreditSkip::NotConfirmed(_),
            } => tracing::warn!(order_id = %order_id, reason = %reason, "Credit skipped"),
            Self::CreditSkipped { order_id, reason } => {
                tracing::error!(order_id = %order_id, reason = %reason, "Completed payment not credited");
            }
        }
    }
}

/// Failures while processing a webhook.
#[derive(Debug, Error)]
pub enum ReconciliationError {
    #[error("staging store error: {0}")]
    Store(#[from] RepositoryError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

/// Ledger reference for a ZenoPay top-up.
#[must_use]
pub fn ledger_reference(record: &PaymentRecord) -> String {
    format!(
        "ZENO:{}:{}",
        record.reference.as_deref().unwrap_or("PUSH"),
        record.order_id
    )
}

/// Idempotency key for a ZenoPay top-up.
#[must_use]
pub fn idempotency_key(order_id: &PaymentOrderId) -> String {
    format!("zenopay:{order_id}")
}

/// Starts top-ups and reconciles gateway notifications.
pub struct ReconciliationService {
    gateway: Arc<dyn PaymentGateway>,
    bins: Arc<dyn PaymentBinStore>,
    ledger: Arc<dyn Ledger>,
    users: Arc<dyn UserDirectory>,
    normalizer: PhoneNormalizer,
    settings: PaymentConfig,
}

impl ReconciliationService {
    /// Wire the service to its collaborators.
    #[must_use]
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        bins: Arc<dyn PaymentBinStore>,
        ledger: Arc<dyn Ledger>,
        users: Arc<dyn UserDirectory>,
        settings: PaymentConfig,
    ) -> Self {
        Self {
            gateway,
            bins,
            ledger,
            users,
            normalizer: PhoneNormalizer::new(settings.country_code.clone()),
            settings,
        }
    }

    /// The top-up rules in force.
    #[must_use]
    pub const fn settings(&self) -> &PaymentConfig {
        &self.settings
    }

    /// Start a mobile-money top-up.
    ///
    /// # Errors
    ///
    /// Returns `InitiationError::Validation` for bad input (nothing is stored
    /// or sent), a gateway variant if the push request failed (the staging
    /// reservation is removed), or `DuplicateOrder` if the generated id was
    /// already taken.
    #[instrument(skip(self, request), fields(order_id = tracing::field::Empty))]
    pub async fn initiate(&self, request: TopUpRequest) -> Result<InitiatedPayment, InitiationError> {
        let email = Email::normalize(&request.email).map_err(ValidationError::from)?;
        let amount = self.validate_amount(&request.amount)?;
        let phone = self
            .normalizer
            .from_subscriber(&request.phone9)
            .map_err(ValidationError::from)?;

        let order_id = PaymentOrderId::generate(
            &self.settings.order_prefix,
            Utc::now(),
            phone.last_digits(ORDER_ID_PHONE_DIGITS),
        );
        tracing::Span::current().record("order_id", order_id.as_str());

        let record = self
            .bins
            .create(NewPaymentRecord {
                order_id: order_id.clone(),
                email: email.clone(),
                phone: phone.clone(),
                metadata: json!({ "gateway": GATEWAY_NAME, "amount": amount.to_string() }),
            })
            .await?;

        let payment = InitiatePayment {
            order_id: record.order_id.to_string(),
            buyer_name: buyer_name(request.name.as_deref(), &email),
            buyer_phone: phone.digits().to_owned(),
            buyer_email: email.to_string(),
            amount,
            webhook_url: self.settings.webhook_url.clone(),
            metadata: json!({ "amount": amount.to_string() }),
        };

        if let Err(err) = self.gateway.initiate(&payment).await {
            tracing::warn!(error = %err, "ZenoPay push request failed");
            self.release(&order_id).await;
            return Err(err.into());
        }

        tracing::info!(amount = %amount, phone = %phone, "ZenoPay payment initiated");
        Ok(InitiatedPayment {
            order_id,
            phone,
            amount,
        })
    }

    /// Process one webhook delivery.
    ///
    /// # Errors
    ///
    /// Returns `ReconciliationError` only for storage failures. Every other
    /// problem is reported through the returned [`WebhookOutcome`].
    #[instrument(skip(self, payload), fields(order_id = tracing::field::Empty))]
    pub async fn handle_webhook(
        &self,
        payload: WebhookPayload,
    ) -> Result<WebhookOutcome, ReconciliationError> {
        let Some(order_id) = payload
            .order_id
            .as_deref()
            .and_then(PaymentOrderId::from_external)
        else {
            return Ok(WebhookOutcome::MissingOrderId);
        };
        tracing::Span::current().record("order_id", order_id.as_str());

        if self.bins.find_by_order_id(&order_id).await?.is_none() {
            return Ok(WebhookOutcome::UnknownOrder(order_id));
        }

        let status = parse_status(payload.payment_status.as_deref());
        let reference = payload
            .reference
            .map(|r| r.trim().to_owned())
            .filter(|r| !r.is_empty());

        let Some(record) = self
            .bins
            .update(&order_id, PaymentUpdate { status, reference })
            .await?
        else {
            return Ok(WebhookOutcome::UnknownOrder(order_id));
        };

        if status != Some(PaymentStatus::Completed) {
            return Ok(WebhookOutcome::Recorded {
                order_id,
                status: record.status,
            });
        }

        self.credit_completed(&record).await
    }

    async fn credit_completed(
        &self,
        record: &PaymentRecord,
    ) -> Result<WebhookOutcome, ReconciliationError> {
        let order_id = record.order_id.clone();
        let skipped = |reason| WebhookOutcome::CreditSkipped {
            order_id: record.order_id.clone(),
            reason,
        };

        let confirmed = match self.gateway.query_status(&order_id).await {
            Ok(confirmed) => confirmed,
            Err(e) => {
                // Nothing retries this order; support credits it by hand.
                tracing::error!(
                    order_id = %order_id,
                    email = %record.email,
                    requested_amount = record.requested_amount().unwrap_or("unknown"),
                    error = %e,
                    "Status query failed for a completed payment; \
                     credit manually with `spoti-cli balance credit`"
                );
                return Ok(skipped(CreditSkip::StatusUnavailable(e)));
            }
        };

        if let Some(reported) = confirmed.payment_status.as_deref()
            && confirmed.status() != Some(PaymentStatus::Completed)
        {
            return Ok(skipped(CreditSkip::NotConfirmed(reported.to_owned())));
        }

        let amount = match confirmed.amount() {
            Ok(amount) => amount,
            Err(e) => return Ok(skipped(CreditSkip::AmountUnparseable(e))),
        };

        let Some(user) = self.users.find_by_email(&record.email).await? else {
            return Ok(skipped(CreditSkip::UserNotFound(record.email.clone())));
        };

        let credited = self
            .ledger
            .credit_once(
                user.id,
                amount,
                &ledger_reference(record),
                &idempotency_key(&order_id),
            )
            .await;

        match credited {
            Ok(CreditOutcome::Applied(transaction)) => Ok(WebhookOutcome::Credited {
                order_id,
                transaction,
            }),
            Ok(CreditOutcome::Duplicate) => Ok(WebhookOutcome::AlreadyCredited { order_id }),
            Err(LedgerError::UserNotFound(_)) => {
                Ok(skipped(CreditSkip::UserNotFound(record.email.clone())))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn validate_amount(&self, raw: &str) -> Result<Amount, ValidationError> {
        let too_small = || ValidationError::Amount {
            minimum: self.settings.min_amount,
        };
        let amount = Amount::parse(raw).map_err(|_| too_small())?;
        if amount.value() < self.settings.min_amount {
            return Err(too_small());
        }
        Ok(amount)
    }

    async fn release(&self, order_id: &PaymentOrderId) {
        if let Err(e) = self.bins.discard_pending(order_id).await {
            tracing::error!(order_id = %order_id, error = %e, "Failed to discard payment reservation");
        }
    }
}

/// Payer name sent to the gateway: the account name, else the email's
/// local part, capped at the gateway's limit.
fn buyer_name(name: Option<&str>, email: &Email) -> String {
    name.map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| email.local_part())
        .chars()
        .take(MAX_BUYER_NAME_CHARS)
        .collect()
}

fn parse_status(raw: Option<&str>) -> Option<PaymentStatus> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty())?;
    match raw.parse() {
        Ok(status) => Some(status),
        Err(_) => {
            tracing::warn!(payment_status = raw, "Ignoring unrecognised payment status");
            None
        }
    }
}
