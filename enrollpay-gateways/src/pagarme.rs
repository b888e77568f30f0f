//! Pagar.me adapter (cards, boleto and Pix for the Brazilian market).
//!
//! Charges are v5 Orders. Webhooks carry a plain hex HMAC-SHA256 of the raw
//! body in the `X-Hub-Signature` header (no timestamp scheme).

use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use enrollpay_types::{
    ChargeReceipt, ChargeRequest, Gateway, GatewayAdapter, GatewayCredentials, GatewayError,
    PaymentMethod, PaymentStatus, ProviderTruth, StatusEvent,
};

use crate::signature::verify_hmac_sha256;

const BASE_URL: &str = "https://api.pagar.me";

pub struct PagarmeAdapter {
    client: reqwest::Client,
    api_key: String,
    webhook_secret: String,
}

impl PagarmeAdapter {
    pub fn new(credentials: &GatewayCredentials, timeout: Duration) -> Result<Self, GatewayError> {
        Ok(Self {
            client: crate::http_client(timeout)?,
            api_key: credentials.api_key.clone(),
            webhook_secret: credentials.webhook_secret.clone(),
        })
    }

    /// Order status vocabulary. `chargedback` has no place in the normal
    /// lifecycle and is parked as `Unknown` for operator review.
    fn map_status(raw: &str) -> PaymentStatus {
        match raw {
            "pending" | "waiting_payment" => PaymentStatus::Pending,
            "processing" => PaymentStatus::Processing,
            "paid" => PaymentStatus::Paid,
            "failed" | "refused" => PaymentStatus::Failed,
            "canceled" => PaymentStatus::Canceled,
            "refunded" => PaymentStatus::Refunded,
            _ => PaymentStatus::Unknown,
        }
    }

    fn wire_method(method: PaymentMethod) -> &'static str {
        match method {
            PaymentMethod::Card => "credit_card",
            PaymentMethod::BankSlip => "boleto",
            PaymentMethod::InstantTransfer => "pix",
            PaymentMethod::Other => "checkout",
        }
    }

    async fn request<T: for<'de> Deserialize<'de>>(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<T, GatewayError> {
        let response = builder
            .basic_auth(&self.api_key, Some(""))
            .send()
            .await
            .map_err(|e| crate::transport_error("pagarme", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| crate::transport_error("pagarme", e))?;

        if status.is_success() {
            return serde_json::from_str(&body)
                .map_err(|e| GatewayError::Malformed(format!("pagarme response: {e}")));
        }
        if status.is_server_error() {
            return Err(GatewayError::Unavailable(format!("pagarme HTTP {status}")));
        }
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| format!("HTTP {status}"));
        Err(GatewayError::Rejected {
            provider: "pagarme".to_string(),
            message,
        })
    }

    async fn fetch_order(&self, order_id: &str) -> Result<PagarmeOrder, GatewayError> {
        self.request(
            self.client
                .get(format!("{BASE_URL}/core/v5/orders/{order_id}")),
        )
        .await
    }
}

#[async_trait::async_trait]
impl GatewayAdapter for PagarmeAdapter {
    fn gateway(&self) -> Gateway {
        Gateway::Pagarme
    }

    async fn create_charge(&self, req: &ChargeRequest) -> Result<ChargeReceipt, GatewayError> {
        let method = Self::wire_method(req.payment_method);
        let mut payment = json!({ "payment_method": method });
        match req.payment_method {
            PaymentMethod::InstantTransfer => {
                payment["pix"] = json!({ "expires_in": 3600 });
            }
            PaymentMethod::BankSlip => {
                payment["boleto"] = json!({ "instructions": "Enrollment payment" });
            }
            _ => {}
        }

        let body = json!({
            "code": req.reference.to_string(),
            "items": [{
                "amount": req.amount.amount(),
                "description": "Enrollment payment",
                "quantity": 1,
            }],
            "customer": {
                "name": req.customer.name,
                "email": req.customer.email,
                "document": req.customer.document,
            },
            "payments": [payment],
            "metadata": req.metadata,
        });

        let order: PagarmeOrder = self
            .request(self.client.post(format!("{BASE_URL}/core/v5/orders")).json(&body))
            .await?;
        debug!(order_id = %order.id, status = %order.status, "pagarme order created");

        Ok(ChargeReceipt {
            status: Self::map_status(&order.status),
            provider_status: order.status.clone(),
            checkout_url: order.checkout_url(),
            provider_token: None,
            payload: order.raw(),
            external_id: order.id,
        })
    }

    async fn query_status(&self, external_id: &str) -> Result<ProviderTruth, GatewayError> {
        let order = self.fetch_order(external_id).await?;

        let status = Self::map_status(&order.status);
        if status == PaymentStatus::Unknown {
            warn!(raw = %order.status, "unmapped pagarme order status");
        }

        Ok(ProviderTruth {
            status,
            provider_status: order.status.clone(),
            paid_amount: order.paid_amount(),
            payload: order.raw(),
        })
    }

    async fn refund(
        &self,
        external_id: &str,
        amount: Option<i64>,
    ) -> Result<ProviderTruth, GatewayError> {
        // Refunds operate on the charge, not the order.
        let order = self.fetch_order(external_id).await?;
        let charge_id = order
            .charges
            .first()
            .map(|c| c.id.clone())
            .ok_or_else(|| GatewayError::Malformed("pagarme order has no charges".to_string()))?;

        let mut url = format!("{BASE_URL}/core/v5/charges/{charge_id}");
        if let Some(minor) = amount {
            url.push_str(&format!("?amount={minor}"));
        }

        let charge: PagarmeCharge = self.request(self.client.delete(url)).await?;
        Ok(ProviderTruth {
            status: Self::map_status(&charge.status),
            provider_status: charge.status.clone(),
            paid_amount: None,
            payload: json!({ "charge_id": charge.id, "status": charge.status }),
        })
    }

    fn verify_and_parse_webhook(
        &self,
        raw_body: &[u8],
        signature_header: &str,
    ) -> Result<StatusEvent, GatewayError> {
        let signature = signature_header
            .trim()
            .strip_prefix("sha256=")
            .unwrap_or(signature_header.trim());
        if !verify_hmac_sha256(raw_body, signature, &self.webhook_secret) {
            return Err(GatewayError::Signature(
                "X-Hub-Signature verification failed".to_string(),
            ));
        }

        let event: PagarmeEvent = serde_json::from_slice(raw_body)
            .map_err(|e| GatewayError::Malformed(format!("pagarme event: {e}")))?;

        // charge.* events reference their order; order.* events are the
        // order itself.
        let external_id = if event.event_type.starts_with("charge.") {
            event
                .data
                .get("order")
                .and_then(|o| o.get("id"))
                .and_then(Value::as_str)
                .map(str::to_string)
        } else {
            event
                .data
                .get("id")
                .and_then(Value::as_str)
                .map(str::to_string)
        }
        .ok_or_else(|| GatewayError::Malformed("pagarme event has no order id".to_string()))?;

        let raw_status = event
            .data
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let status = Self::map_status(&raw_status);

        let paid_amount = event
            .data
            .get("paid_amount")
            .or_else(|| event.data.get("amount"))
            .and_then(Value::as_i64)
            .filter(|n| *n > 0 && status == PaymentStatus::Paid);

        Ok(StatusEvent::new(
            Gateway::Pagarme,
            external_id,
            status,
            format!("{}:{}", event.event_type, raw_status),
            serde_json::from_slice(raw_body)
                .map_err(|e| GatewayError::Malformed(e.to_string()))?,
        )
        .with_paid_amount(paid_amount))
    }
}

#[derive(Debug, Deserialize)]
struct PagarmeOrder {
    id: String,
    status: String,
    #[serde(default)]
    charges: Vec<PagarmeCharge>,
    #[serde(default)]
    checkouts: Vec<PagarmeCheckout>,
}

impl PagarmeOrder {
    fn checkout_url(&self) -> Option<String> {
        if let Some(url) = self.checkouts.first().and_then(|c| c.payment_url.clone()) {
            return Some(url);
        }
        self.charges
            .first()
            .and_then(|c| c.last_transaction.as_ref())
            .and_then(|t| {
                t.qr_code_url
                    .clone()
                    .or_else(|| t.pdf.clone())
                    .or_else(|| t.url.clone())
            })
    }

    fn paid_amount(&self) -> Option<i64> {
        self.charges.first().and_then(|c| c.paid_amount)
    }

    fn raw(&self) -> Value {
        json!({ "id": self.id, "status": self.status })
    }
}

#[derive(Debug, Deserialize)]
struct PagarmeCharge {
    id: String,
    status: String,
    #[serde(default)]
    paid_amount: Option<i64>,
    #[serde(default)]
    last_transaction: Option<PagarmeTransaction>,
}

#[derive(Debug, Deserialize)]
struct PagarmeTransaction {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    pdf: Option<String>,
    #[serde(default)]
    qr_code_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PagarmeCheckout {
    #[serde(default)]
    payment_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PagarmeEvent {
    #[serde(rename = "type")]
    event_type: String,
    data: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::hmac_sha256_hex;

    fn adapter() -> PagarmeAdapter {
        PagarmeAdapter::new(
            &GatewayCredentials {
                api_key: "sk_test_abc".to_string(),
                webhook_secret: "hub_secret".to_string(),
                sandbox: true,
            },
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_status_map() {
        assert_eq!(PagarmeAdapter::map_status("pending"), PaymentStatus::Pending);
        assert_eq!(
            PagarmeAdapter::map_status("waiting_payment"),
            PaymentStatus::Pending
        );
        assert_eq!(PagarmeAdapter::map_status("paid"), PaymentStatus::Paid);
        assert_eq!(PagarmeAdapter::map_status("refused"), PaymentStatus::Failed);
        assert_eq!(
            PagarmeAdapter::map_status("refunded"),
            PaymentStatus::Refunded
        );
        assert_eq!(
            PagarmeAdapter::map_status("chargedback"),
            PaymentStatus::Unknown
        );
    }

    #[test]
    fn test_webhook_paid_event() {
        let adapter = adapter();
        let body =
            br#"{"type":"order.paid","data":{"id":"or_1","status":"paid","paid_amount":98000}}"#;
        let header = hmac_sha256_hex(body, "hub_secret");

        let event = adapter.verify_and_parse_webhook(body, &header).unwrap();
        assert_eq!(event.status, PaymentStatus::Paid);
        assert_eq!(event.external_id, "or_1");
        assert_eq!(event.paid_amount, Some(98000));
    }

    #[test]
    fn test_webhook_accepts_prefixed_header() {
        let adapter = adapter();
        let body = br#"{"type":"order.canceled","data":{"id":"or_2","status":"canceled"}}"#;
        let header = format!("sha256={}", hmac_sha256_hex(body, "hub_secret"));

        let event = adapter.verify_and_parse_webhook(body, &header).unwrap();
        assert_eq!(event.status, PaymentStatus::Canceled);
    }

    #[test]
    fn test_webhook_bad_signature_rejected() {
        let adapter = adapter();
        let body = br#"{"type":"order.paid","data":{"id":"or_1","status":"paid"}}"#;
        let header = hmac_sha256_hex(body, "some_other_secret");

        let err = adapter.verify_and_parse_webhook(body, &header).unwrap_err();
        assert!(matches!(err, GatewayError::Signature(_)));
    }

    #[test]
    fn test_webhook_charge_event_uses_order_id() {
        let adapter = adapter();
        let body = br#"{"type":"charge.refunded","data":{"id":"ch_5","status":"refunded","order":{"id":"or_7"}}}"#;
        let header = hmac_sha256_hex(body, "hub_secret");

        let event = adapter.verify_and_parse_webhook(body, &header).unwrap();
        assert_eq!(event.status, PaymentStatus::Refunded);
        assert_eq!(event.external_id, "or_7");
    }
}
