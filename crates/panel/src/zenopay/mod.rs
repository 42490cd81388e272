//! ZenoPay mobile-money gateway.
//!
//! Two calls are used: a push request that prompts the customer's handset to
//! confirm a payment, and an order-status query used to confirm a webhook
//! before money is credited. Neither is retried here; callers decide.

mod client;
mod error;
mod types;

use async_trait::async_trait;

use spoti_boost_core::PaymentOrderId;

pub use client::{DEFAULT_PAY_URL, DEFAULT_STATUS_URL, ZenoPayClient};
pub use error::GatewayError;
pub use types::{
    InitiatePayment, InitiateResponse, OrderStatus, RawAmount, StatusData, StatusEntry,
    StatusResponse, WebhookPayload,
};

/// A mobile-money gateway.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Send a push payment request.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Rejected` unless the gateway reports success.
    async fn initiate(&self, payment: &InitiatePayment) -> Result<InitiateResponse, GatewayError>;

    /// Fetch the authoritative status of an order.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError` if the request fails or the body is malformed.
    async fn query_status(&self, order_id: &PaymentOrderId) -> Result<OrderStatus, GatewayError>;
}
