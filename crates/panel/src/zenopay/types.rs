//! ZenoPay wire types.
//!
//! The order-status endpoint is loosely specified: the payment details may
//! arrive as `{"data": [..]}`, `{"data": {"data": [..]}}`, `{"data": {..}}`
//! or directly at the top level, and amounts come as strings or numbers.
//! [`StatusResponse`] accepts all of these and [`OrderStatus`] is the single
//! normalized view the rest of the panel works with.
//!
//! Incoming text fields are read leniently: a number where a string was
//! expected is kept as its digits, and any other type reads as absent, so a
//! single odd field never rejects the whole body.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use spoti_boost_core::{Amount, AmountError, PaymentStatus};

/// Body of a mobile-money push request.
#[derive(Debug, Clone, Serialize)]
pub struct InitiatePayment {
    pub order_id: String,
    pub buyer_name: String,
    /// MSISDN without the leading plus, e.g. `255712345678`.
    pub buyer_phone: String,
    pub buyer_email: String,
    #[serde(serialize_with = "serialize_amount")]
    pub amount: Amount,
    pub webhook_url: String,
    pub metadata: serde_json::Value,
}

/// Amounts go out as JSON numbers, integral when possible.
fn serialize_amount<S: Serializer>(amount: &Amount, serializer: S) -> Result<S::Ok, S::Error> {
    let value: Decimal = amount.value();
    if value.fract().is_zero()
        && let Some(whole) = value.to_i64()
    {
        return serializer.serialize_i64(whole);
    }
    match value.to_f64() {
        Some(float) => serializer.serialize_f64(float),
        None => serializer.serialize_str(&value.to_string()),
    }
}

/// Response to a push request.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct InitiateResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub resultcode: Option<String>,
}

impl InitiateResponse {
    /// The gateway accepted the push request.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.trim().eq_ignore_ascii_case("success")
    }
}

/// Webhook notification body.
///
/// Every field is optional; the handler decides what a missing field means.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct WebhookPayload {
    #[serde(default, deserialize_with = "lenient_text")]
    pub order_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub payment_status: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub reference: Option<String>,
}

/// A string or number as text; anything else reads as absent.
fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => Some(text),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    })
}

/// A string or number amount; anything else reads as absent.
fn lenient_amount<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<RawAmount>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => Some(RawAmount::Text(text)),
        Value::Number(number) => Some(RawAmount::Number(number)),
        _ => None,
    })
}

/// An amount as the gateway sends it.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum RawAmount {
    Text(String),
    Number(serde_json::Number),
}

impl RawAmount {
    /// Parse into a positive [`Amount`].
    ///
    /// # Errors
    ///
    /// Returns `AmountError` for non-numeric, zero or negative values.
    pub fn to_amount(&self) -> Result<Amount, AmountError> {
        match self {
            Self::Text(text) => Amount::parse(text),
            Self::Number(number) => Amount::parse(&number.to_string()),
        }
    }
}

/// One payment entry inside a status response.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct StatusEntry {
    #[serde(default, deserialize_with = "lenient_text")]
    pub order_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub amount: Option<RawAmount>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub payment_status: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub reference: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub transid: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub channel: Option<String>,
}

/// The `data` member of a status response.
///
/// Kept as raw JSON so that a shape we do not recognise falls back to the
/// top-level fields instead of failing the whole response.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct StatusData(pub Value);

impl StatusData {
    /// The first entry of `[..]` or `{"data": [..]}`, else the innermost object.
    fn into_entry(self) -> Option<StatusEntry> {
        let candidate = match self.0 {
            Value::Array(entries) => entries.into_iter().next()?,
            Value::Object(mut fields) => match fields.remove("data") {
                Some(Value::Array(entries)) => entries.into_iter().next()?,
                Some(Value::Object(inner)) => Value::Object(inner),
                _ => Value::Object(fields),
            },
            _ => return None,
        };

        if !candidate.is_object() {
            return None;
        }
        serde_json::from_value(candidate).ok()
    }
}

/// Raw order-status response.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct StatusResponse {
    #[serde(default)]
    pub data: Option<StatusData>,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub amount: Option<RawAmount>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub payment_status: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub reference: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub result: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub message: Option<String>,
}

/// Normalized order status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderStatus {
    pub order_id: Option<String>,
    pub payment_status: Option<String>,
    pub amount: Option<RawAmount>,
    pub reference: Option<String>,
    pub transid: Option<String>,
    pub channel: Option<String>,
}

impl OrderStatus {
    /// The paid amount.
    ///
    /// # Errors
    ///
    /// Returns `AmountError` if the amount is missing, non-numeric or not
    /// positive.
    pub fn amount(&self) -> Result<Amount, AmountError> {
        self.amount
            .as_ref()
            .ok_or_else(|| AmountError::Unparseable("missing".to_owned()))?
            .to_amount()
    }

    /// The reported status, if present and recognised.
    #[must_use]
    pub fn status(&self) -> Option<PaymentStatus> {
        self.payment_status.as_deref()?.parse().ok()
    }
}

impl From<StatusResponse> for OrderStatus {
    fn from(response: StatusResponse) -> Self {
        let entry = response
            .data
            .and_then(StatusData::into_entry)
            .unwrap_or_default();

        Self {
            order_id: entry.order_id,
            payment_status: entry.payment_status.or(response.payment_status),
            amount: entry.amount.or(response.amount),
            reference: entry.reference.or(response.reference),
            transid: entry.transid,
            channel: entry.channel,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn normalize(body: serde_json::Value) -> OrderStatus {
        serde_json::from_value::<StatusResponse>(body).unwrap().into()
    }

    #[test]
    fn test_documented_list_shape() {
        let status = normalize(json!({
            "reference": "0936183435",
            "resultcode": "000",
            "result": "SUCCESS",
            "message": "Order fetch successful",
            "data": [{
                "order_id": "3rer407fe-3ee8-4525-456f-ccb95de38250",
                "creation_date": "2025-05-19 08:40:33",
                "amount": "500",
                "payment_status": "COMPLETED",
                "transid": "CEJ3I3SETSN",
                "channel": "MPESA-TZ",
                "reference": "0936183435",
                "msisdn": "255744963858"
            }]
        }));

        assert_eq!(status.amount().unwrap().value(), Decimal::from(500));
        assert_eq!(status.status(), Some(PaymentStatus::Completed));
        assert_eq!(status.reference.as_deref(), Some("0936183435"));
        assert_eq!(status.channel.as_deref(), Some("MPESA-TZ"));
    }

    #[test]
    fn test_nested_single_and_flat_shapes() {
        let nested = normalize(json!({"data": {"data": [{"amount": "1000"}]}}));
        assert_eq!(nested.amount().unwrap().value(), Decimal::from(1000));

        let single = normalize(json!({"data": {"amount": 1500, "payment_status": "PENDING"}}));
        assert_eq!(single.amount().unwrap().value(), Decimal::from(1500));
        assert_eq!(single.status(), Some(PaymentStatus::Pending));

        let flat = normalize(json!({"amount": "2000.00", "payment_status": "COMPLETED"}));
        assert_eq!(flat.amount().unwrap().value(), Decimal::from(2000));
    }

    #[test]
    fn test_entry_fields_win_over_top_level() {
        let status = normalize(json!({
            "amount": "1",
            "data": [{"amount": "1000"}]
        }));
        assert_eq!(status.amount().unwrap().value(), Decimal::from(1000));

        let fallback = normalize(json!({"amount": "750", "data": []}));
        assert_eq!(fallback.amount().unwrap().value(), Decimal::from(750));
    }

    #[test]
    fn test_unrecognised_data_falls_back_to_top_level() {
        let text = normalize(json!({
            "data": "Order fetch successful",
            "amount": "1000",
            "payment_status": "COMPLETED"
        }));
        assert_eq!(text.amount().unwrap().value(), Decimal::from(1000));
        assert_eq!(text.status(), Some(PaymentStatus::Completed));

        let odd_list = normalize(json!({"data": ["COMPLETED"], "amount": 1200}));
        assert_eq!(odd_list.amount().unwrap().value(), Decimal::from(1200));

        let nested_object = normalize(json!({"data": {"data": {"amount": "900"}}}));
        assert_eq!(nested_object.amount().unwrap().value(), Decimal::from(900));
    }

    #[test]
    fn test_numeric_text_fields_are_kept_as_digits() {
        let status = normalize(json!({
            "data": [{
                "amount": "1000",
                "payment_status": "COMPLETED",
                "reference": 994_780_437,
                "transid": 77
            }]
        }));
        assert_eq!(status.amount().unwrap().value(), Decimal::from(1000));
        assert_eq!(status.reference.as_deref(), Some("994780437"));
        assert_eq!(status.transid.as_deref(), Some("77"));

        let odd_types = normalize(json!({
            "data": [{"amount": {"value": 1}, "channel": ["MPESA"]}],
            "amount": "300"
        }));
        assert_eq!(odd_types.amount().unwrap().value(), Decimal::from(300));
        assert_eq!(odd_types.channel, None);
    }

    #[test]
    fn test_webhook_accepts_numeric_reference() {
        let payload: WebhookPayload = serde_json::from_value(json!({
            "order_id": "SPOTIORD-X-345678",
            "payment_status": "COMPLETED",
            "reference": 994_780_437
        }))
        .unwrap();
        assert_eq!(payload.reference.as_deref(), Some("994780437"));
        assert_eq!(payload.order_id.as_deref(), Some("SPOTIORD-X-345678"));

        let sparse: WebhookPayload =
            serde_json::from_value(json!({"payment_status": null, "extra": true})).unwrap();
        assert_eq!(sparse, WebhookPayload::default());
    }

    #[test]
    fn test_bad_amounts() {
        assert!(normalize(json!({"data": []})).amount().is_err());
        assert!(normalize(json!({"amount": "abc"})).amount().is_err());
        assert!(normalize(json!({"amount": 0})).amount().is_err());
        assert!(normalize(json!({"data": null})).status().is_none());
    }

    #[test]
    fn test_initiate_payload_sends_numeric_amount() {
        let payload = InitiatePayment {
            order_id: "SPOTIORD-1-345678".to_owned(),
            buyer_name: "mteja".to_owned(),
            buyer_phone: "255712345678".to_owned(),
            buyer_email: "mteja@example.com".to_owned(),
            amount: Amount::parse("1000").unwrap(),
            webhook_url: "https://panel.example.com/zeno/zenopay-webhook".to_owned(),
            metadata: json!({"amount": "1000"}),
        };

        let body = serde_json::to_value(&payload).unwrap();
        assert_eq!(body["amount"], json!(1000));
        assert_eq!(body["buyer_phone"], json!("255712345678"));
    }

    #[test]
    fn test_initiate_response_success_is_case_insensitive() {
        let ok: InitiateResponse =
            serde_json::from_value(json!({"status": "success", "order_id": "X"})).unwrap();
        assert!(ok.is_success());

        let failed: InitiateResponse =
            serde_json::from_value(json!({"status": "error", "message": "Invalid API key"}))
                .unwrap();
        assert!(!failed.is_success());
        assert!(!InitiateResponse::default().is_success());
    }
}
