//! Stripe adapter (card payments).
//!
//! Charges are Stripe PaymentIntents. Webhooks carry the
//! `Stripe-Signature` header (`t=<ts>,v1=<hmac>` over `"{t}.{body}"`) with a
//! 5-minute timestamp tolerance.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use enrollpay_types::{
    ChargeReceipt, ChargeRequest, Gateway, GatewayAdapter, GatewayCredentials, GatewayError,
    PaymentStatus, ProviderTruth, StatusEvent,
};

use crate::signature::verify_timestamped_v1;

const BASE_URL: &str = "https://api.stripe.com";
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

pub struct StripeAdapter {
    client: reqwest::Client,
    api_key: String,
    webhook_secret: String,
}

impl StripeAdapter {
    pub fn new(credentials: &GatewayCredentials, timeout: Duration) -> Result<Self, GatewayError> {
        Ok(Self {
            client: crate::http_client(timeout)?,
            api_key: credentials.api_key.clone(),
            webhook_secret: credentials.webhook_secret.clone(),
        })
    }

    /// PaymentIntent status vocabulary. Anything unlisted surfaces as
    /// `Unknown` so vocabulary drift is flagged, never mistaken for
    /// `Pending`.
    fn map_intent_status(raw: &str) -> PaymentStatus {
        match raw {
            "requires_payment_method" | "requires_confirmation" | "requires_action" => {
                PaymentStatus::Pending
            }
            "processing" | "requires_capture" => PaymentStatus::Processing,
            "succeeded" => PaymentStatus::Paid,
            "canceled" => PaymentStatus::Canceled,
            _ => PaymentStatus::Unknown,
        }
    }

    async fn post_form<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        form: &[(String, String)],
    ) -> Result<T, GatewayError> {
        let response = self
            .client
            .post(format!("{BASE_URL}{path}"))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .form(form)
            .send()
            .await
            .map_err(|e| crate::transport_error("stripe", e))?;
        Self::read_response(response).await
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T, GatewayError> {
        let response = self
            .client
            .get(format!("{BASE_URL}{path}"))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .send()
            .await
            .map_err(|e| crate::transport_error("stripe", e))?;
        Self::read_response(response).await
    }

    async fn read_response<T: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
    ) -> Result<T, GatewayError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| crate::transport_error("stripe", e))?;

        if status.is_success() {
            return serde_json::from_str(&body)
                .map_err(|e| GatewayError::Malformed(format!("stripe response: {e}")));
        }
        if status.is_server_error() {
            return Err(GatewayError::Unavailable(format!("stripe HTTP {status}")));
        }
        let message = serde_json::from_str::<StripeErrorEnvelope>(&body)
            .map(|env| env.error.message)
            .unwrap_or_else(|_| format!("HTTP {status}"));
        Err(GatewayError::Rejected {
            provider: "stripe".to_string(),
            message,
        })
    }
}

#[async_trait::async_trait]
impl GatewayAdapter for StripeAdapter {
    fn gateway(&self) -> Gateway {
        Gateway::Stripe
    }

    async fn create_charge(&self, req: &ChargeRequest) -> Result<ChargeReceipt, GatewayError> {
        let form = vec![
            ("amount".to_string(), req.amount.amount().to_string()),
            (
                "currency".to_string(),
                req.amount.currency().code().to_ascii_lowercase(),
            ),
            ("receipt_email".to_string(), req.customer.email.clone()),
            (
                "payment_method_types[]".to_string(),
                "card".to_string(),
            ),
            (
                "metadata[payment_id]".to_string(),
                req.reference.to_string(),
            ),
        ];

        let intent: StripeIntent = self.post_form("/v1/payment_intents", &form).await?;
        debug!(intent_id = %intent.id, status = %intent.status, "stripe intent created");

        Ok(ChargeReceipt {
            status: Self::map_intent_status(&intent.status),
            provider_status: intent.status.clone(),
            checkout_url: None,
            provider_token: intent.client_secret.clone(),
            payload: intent.raw(),
            external_id: intent.id,
        })
    }

    async fn query_status(&self, external_id: &str) -> Result<ProviderTruth, GatewayError> {
        let intent: StripeIntent = self
            .get_json(&format!("/v1/payment_intents/{external_id}"))
            .await?;

        let status = Self::map_intent_status(&intent.status);
        if status == PaymentStatus::Unknown {
            warn!(raw = %intent.status, "unmapped stripe intent status");
        }

        Ok(ProviderTruth {
            status,
            provider_status: intent.status.clone(),
            paid_amount: intent.amount_received,
            payload: intent.raw(),
        })
    }

    async fn refund(
        &self,
        external_id: &str,
        amount: Option<i64>,
    ) -> Result<ProviderTruth, GatewayError> {
        let mut form = vec![("payment_intent".to_string(), external_id.to_string())];
        if let Some(minor) = amount {
            form.push(("amount".to_string(), minor.to_string()));
        }

        let refund: StripeRefund = self.post_form("/v1/refunds", &form).await?;
        // A pending refund leaves the record Paid until the provider
        // confirms; the confirmation arrives via webhook or reconciliation.
        let status = match refund.status.as_str() {
            "succeeded" => PaymentStatus::Refunded,
            "pending" | "requires_action" => PaymentStatus::Paid,
            _ => PaymentStatus::Unknown,
        };

        Ok(ProviderTruth {
            status,
            provider_status: refund.status.clone(),
            paid_amount: None,
            payload: serde_json::json!({ "refund_id": refund.id, "status": refund.status }),
        })
    }

    fn verify_and_parse_webhook(
        &self,
        raw_body: &[u8],
        signature_header: &str,
    ) -> Result<StatusEvent, GatewayError> {
        let now = chrono::Utc::now().timestamp();
        if !verify_timestamped_v1(
            raw_body,
            signature_header,
            &self.webhook_secret,
            SIGNATURE_TOLERANCE_SECS,
            now,
        ) {
            return Err(GatewayError::Signature(
                "Stripe-Signature verification failed".to_string(),
            ));
        }

        let event: StripeEvent = serde_json::from_slice(raw_body)
            .map_err(|e| GatewayError::Malformed(format!("stripe event: {e}")))?;
        let object = &event.data.object;

        // The event type, not the embedded object status, is authoritative:
        // a payment_failed event carries status requires_payment_method.
        let (status, external_id) = match event.event_type.as_str() {
            "payment_intent.succeeded" => (PaymentStatus::Paid, object.id_field()?),
            "payment_intent.processing" => (PaymentStatus::Processing, object.id_field()?),
            "payment_intent.payment_failed" => (PaymentStatus::Failed, object.id_field()?),
            "payment_intent.canceled" => (PaymentStatus::Canceled, object.id_field()?),
            "charge.refunded" => (PaymentStatus::Refunded, object.payment_intent_field()?),
            _ => (PaymentStatus::Unknown, object.any_reference()?),
        };

        let paid_amount = object
            .0
            .get("amount_received")
            .and_then(Value::as_i64)
            .filter(|n| *n > 0);

        Ok(StatusEvent::new(
            Gateway::Stripe,
            external_id,
            status,
            event.event_type,
            serde_json::from_slice(raw_body)
                .map_err(|e| GatewayError::Malformed(e.to_string()))?,
        )
        .with_paid_amount(paid_amount))
    }
}

#[derive(Debug, Deserialize)]
struct StripeIntent {
    id: String,
    status: String,
    #[serde(default)]
    client_secret: Option<String>,
    #[serde(default)]
    amount_received: Option<i64>,
}

impl StripeIntent {
    fn raw(&self) -> Value {
        serde_json::json!({
            "id": self.id,
            "status": self.status,
            "amount_received": self.amount_received,
        })
    }
}

#[derive(Debug, Deserialize)]
struct StripeRefund {
    id: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct StripeEvent {
    #[serde(rename = "type")]
    event_type: String,
    data: StripeEventData,
}

#[derive(Debug, Deserialize)]
struct StripeEventData {
    object: StripeEventObject,
}

#[derive(Debug, Deserialize)]
struct StripeEventObject(Value);

impl StripeEventObject {
    fn id_field(&self) -> Result<String, GatewayError> {
        self.0
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| GatewayError::Malformed("stripe event object missing id".to_string()))
    }

    /// Charge events reference their intent via `payment_intent`.
    fn payment_intent_field(&self) -> Result<String, GatewayError> {
        self.0
            .get("payment_intent")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                GatewayError::Malformed("stripe charge event missing payment_intent".to_string())
            })
    }

    fn any_reference(&self) -> Result<String, GatewayError> {
        self.0
            .get("payment_intent")
            .or_else(|| self.0.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                GatewayError::Malformed("stripe event has no usable reference".to_string())
            })
    }
}

#[derive(Debug, Deserialize)]
struct StripeErrorEnvelope {
    error: StripeErrorBody,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::hmac_sha256_hex;

    fn adapter() -> StripeAdapter {
        StripeAdapter::new(
            &GatewayCredentials {
                api_key: "sk_test_abc".to_string(),
                webhook_secret: "whsec_test123".to_string(),
                sandbox: true,
            },
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn sign(payload: &[u8], secret: &str) -> String {
        let ts = chrono::Utc::now().timestamp();
        let signed = format!("{}.{}", ts, String::from_utf8_lossy(payload));
        format!("t={ts},v1={}", hmac_sha256_hex(signed.as_bytes(), secret))
    }

    #[test]
    fn test_status_map() {
        assert_eq!(
            StripeAdapter::map_intent_status("requires_payment_method"),
            PaymentStatus::Pending
        );
        assert_eq!(
            StripeAdapter::map_intent_status("processing"),
            PaymentStatus::Processing
        );
        assert_eq!(
            StripeAdapter::map_intent_status("succeeded"),
            PaymentStatus::Paid
        );
        assert_eq!(
            StripeAdapter::map_intent_status("canceled"),
            PaymentStatus::Canceled
        );
        assert_eq!(
            StripeAdapter::map_intent_status("some_new_state"),
            PaymentStatus::Unknown
        );
    }

    #[test]
    fn test_webhook_paid_event() {
        let adapter = adapter();
        let body = br#"{"type":"payment_intent.succeeded","data":{"object":{"id":"pi_123","status":"succeeded","amount_received":125000}}}"#;
        let header = sign(body, "whsec_test123");

        let event = adapter.verify_and_parse_webhook(body, &header).unwrap();
        assert_eq!(event.status, PaymentStatus::Paid);
        assert_eq!(event.external_id, "pi_123");
        assert_eq!(event.paid_amount, Some(125000));
    }

    #[test]
    fn test_webhook_wrong_secret_rejected() {
        let adapter = adapter();
        let body = br#"{"type":"payment_intent.succeeded","data":{"object":{"id":"pi_123"}}}"#;
        let header = sign(body, "the_wrong_secret");

        let err = adapter.verify_and_parse_webhook(body, &header).unwrap_err();
        assert!(matches!(err, GatewayError::Signature(_)));
    }

    #[test]
    fn test_webhook_tampered_body_rejected() {
        let adapter = adapter();
        let original = br#"{"type":"payment_intent.succeeded","data":{"object":{"id":"pi_123"}}}"#;
        let header = sign(original, "whsec_test123");
        let tampered = br#"{"type":"payment_intent.succeeded","data":{"object":{"id":"pi_999"}}}"#;

        let err = adapter
            .verify_and_parse_webhook(tampered, &header)
            .unwrap_err();
        assert!(matches!(err, GatewayError::Signature(_)));
    }

    #[test]
    fn test_webhook_unlisted_event_maps_unknown() {
        let adapter = adapter();
        let body = br#"{"type":"payment_intent.amount_capturable_updated","data":{"object":{"id":"pi_123"}}}"#;
        let header = sign(body, "whsec_test123");

        let event = adapter.verify_and_parse_webhook(body, &header).unwrap();
        assert_eq!(event.status, PaymentStatus::Unknown);
        assert_eq!(event.provider_status, "payment_intent.amount_capturable_updated");
    }

    #[test]
    fn test_webhook_refund_uses_intent_reference() {
        let adapter = adapter();
        let body = br#"{"type":"charge.refunded","data":{"object":{"id":"ch_9","payment_intent":"pi_123"}}}"#;
        let header = sign(body, "whsec_test123");

        let event = adapter.verify_and_parse_webhook(body, &header).unwrap();
        assert_eq!(event.status, PaymentStatus::Refunded);
        assert_eq!(event.external_id, "pi_123");
    }
}
