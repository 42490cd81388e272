//! HTTP client for the ZenoPay API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use tracing::instrument;

use spoti_boost_core::PaymentOrderId;

use super::{
    GatewayError, InitiatePayment, InitiateResponse, OrderStatus, PaymentGateway, StatusResponse,
};
use crate::config::ZenoPayConfig;

/// Production push-payment endpoint.
pub const DEFAULT_PAY_URL: &str = "https://zenoapi.com/api/payments/mobile_money_tanzania";

/// Production order-status endpoint.
pub const DEFAULT_STATUS_URL: &str = "https://zenoapi.com/api/payments/order-status";

const API_KEY_HEADER: &str = "x-api-key";

/// ZenoPay API client.
///
/// Cheap to clone; the underlying connection pool is shared.
#[derive(Clone)]
pub struct ZenoPayClient {
    client: reqwest::Client,
    pay_url: String,
    status_url: String,
    initiate_timeout: Duration,
    status_timeout: Duration,
}

impl std::fmt::Debug for ZenoPayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZenoPayClient")
            .field("pay_url", &self.pay_url)
            .field("status_url", &self.status_url)
            .field("initiate_timeout", &self.initiate_timeout)
            .field("status_timeout", &self.status_timeout)
            .finish_non_exhaustive()
    }
}

impl ZenoPayClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Config` if the API key is not a valid header
    /// value or the HTTP client fails to build.
    pub fn new(config: &ZenoPayConfig) -> Result<Self, GatewayError> {
        let mut api_key = HeaderValue::from_str(config.api_key.expose_secret())
            .map_err(|e| GatewayError::Config(format!("invalid API key format: {e}")))?;
        api_key.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, api_key);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(concat!("spoti-boost-panel/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GatewayError::Config(e.to_string()))?;

        Ok(Self {
            client,
            pay_url: config.pay_url.clone(),
            status_url: config.status_url.clone(),
            initiate_timeout: config.initiate_timeout,
            status_timeout: config.status_timeout,
        })
    }
}

#[async_trait]
impl PaymentGateway for ZenoPayClient {
    #[instrument(skip(self, payment), fields(order_id = %payment.order_id))]
    async fn initiate(&self, payment: &InitiatePayment) -> Result<InitiateResponse, GatewayError> {
        let response = self
            .client
            .post(&self.pay_url)
            .timeout(self.initiate_timeout)
            .json(payment)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        let parsed: Option<InitiateResponse> = serde_json::from_str(&body).ok();

        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "ZenoPay refused push request");
            return Err(GatewayError::Rejected {
                status: Some(status.as_u16()),
                message: parsed
                    .and_then(|r| r.message)
                    .unwrap_or_else(|| format!("HTTP {}", status.as_u16())),
            });
        }

        let parsed = parsed.ok_or_else(|| GatewayError::Decode(truncate(&body)))?;
        if !parsed.is_success() {
            tracing::warn!(gateway_status = %parsed.status, "ZenoPay did not accept push request");
            return Err(GatewayError::Rejected {
                status: None,
                message: parsed
                    .message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| "payment initiation failed".to_owned()),
            });
        }

        tracing::info!("ZenoPay push request accepted");
        Ok(parsed)
    }

    #[instrument(skip(self), fields(order_id = %order_id))]
    async fn query_status(&self, order_id: &PaymentOrderId) -> Result<OrderStatus, GatewayError> {
        let response = self
            .client
            .get(&self.status_url)
            .timeout(self.status_timeout)
            .query(&[("order_id", order_id.as_str())])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(GatewayError::Rejected {
                status: Some(status.as_u16()),
                message: truncate(&body),
            });
        }

        let parsed: StatusResponse =
            serde_json::from_str(&body).map_err(|e| GatewayError::Decode(e.to_string()))?;
        let order = OrderStatus::from(parsed);
        tracing::debug!(payment_status = ?order.payment_status, "ZenoPay order status");
        Ok(order)
    }
}

/// Keep error messages from echoing whole response bodies into logs.
fn truncate(body: &str) -> String {
    const LIMIT: usize = 200;
    match body.char_indices().nth(LIMIT) {
        Some((end, _)) => format!("{}...", body.get(..end).unwrap_or(body)),
        None => body.to_owned(),
    }
}
