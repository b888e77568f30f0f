//! Asaas adapter (boleto and Pix, Brazilian market).
//!
//! Asaas authenticates webhooks with a shared token in the
//! `asaas-access-token` header rather than an HMAC; the token is compared in
//! constant time against the tenant's webhook secret. Amounts go over the
//! wire in major units (reais), converted at this boundary only.

use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use enrollpay_types::{
    ChargeReceipt, ChargeRequest, Gateway, GatewayAdapter, GatewayCredentials, GatewayError,
    PaymentMethod, PaymentStatus, ProviderTruth, StatusEvent,
};

use crate::signature::tokens_match;

const PRODUCTION_URL: &str = "https://api.asaas.com";
const SANDBOX_URL: &str = "https://api-sandbox.asaas.com";

/// Days until a newly created charge is due.
const DUE_IN_DAYS: i64 = 3;

pub struct AsaasAdapter {
    client: reqwest::Client,
    api_key: String,
    webhook_token: String,
    base_url: &'static str,
}

impl AsaasAdapter {
    pub fn new(credentials: &GatewayCredentials, timeout: Duration) -> Result<Self, GatewayError> {
        Ok(Self {
            client: crate::http_client(timeout)?,
            api_key: credentials.api_key.clone(),
            webhook_token: credentials.webhook_secret.clone(),
            base_url: if credentials.sandbox {
                SANDBOX_URL
            } else {
                PRODUCTION_URL
            },
        })
    }

    fn map_status(raw: &str) -> PaymentStatus {
        match raw {
            "PENDING" | "OVERDUE" | "AWAITING_PAYMENT" => PaymentStatus::Pending,
            "AWAITING_RISK_ANALYSIS" => PaymentStatus::Processing,
            "RECEIVED" | "CONFIRMED" | "RECEIVED_IN_CASH" => PaymentStatus::Paid,
            "REFUNDED" => PaymentStatus::Refunded,
            "DELETED" => PaymentStatus::Canceled,
            _ => PaymentStatus::Unknown,
        }
    }

    fn wire_method(method: PaymentMethod) -> &'static str {
        match method {
            PaymentMethod::Card => "CREDIT_CARD",
            PaymentMethod::BankSlip => "BOLETO",
            PaymentMethod::InstantTransfer => "PIX",
            PaymentMethod::Other => "UNDEFINED",
        }
    }

    /// Minor units to the wire's major-unit decimal ("980.00").
    fn wire_value(minor: i64) -> String {
        format!("{}.{:02}", minor / 100, minor % 100)
    }

    /// Wire major-unit decimal back to minor units.
    fn minor_from_value(value: f64) -> i64 {
        (value * 100.0).round() as i64
    }

    async fn request<T: for<'de> Deserialize<'de>>(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<T, GatewayError> {
        let response = builder
            .header("access_token", &self.api_key)
            .send()
            .await
            .map_err(|e| crate::transport_error("asaas", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| crate::transport_error("asaas", e))?;

        if status.is_success() {
            return serde_json::from_str(&body)
                .map_err(|e| GatewayError::Malformed(format!("asaas response: {e}")));
        }
        if status.is_server_error() {
            return Err(GatewayError::Unavailable(format!("asaas HTTP {status}")));
        }
        let message = serde_json::from_str::<AsaasErrors>(&body)
            .ok()
            .and_then(|e| e.errors.into_iter().next().map(|d| d.description))
            .unwrap_or_else(|| format!("HTTP {status}"));
        Err(GatewayError::Rejected {
            provider: "asaas".to_string(),
            message,
        })
    }

    /// Asaas charges hang off a customer record; the customer is created (or
    /// matched by document on their side) before the charge.
    async fn ensure_customer(&self, req: &ChargeRequest) -> Result<String, GatewayError> {
        let body = json!({
            "name": req.customer.name,
            "email": req.customer.email,
            "cpfCnpj": req.customer.document,
            "externalReference": req.reference.to_string(),
        });
        let customer: AsaasCustomer = self
            .request(
                self.client
                    .post(format!("{}/v3/customers", self.base_url))
                    .json(&body),
            )
            .await?;
        Ok(customer.id)
    }
}

#[async_trait::async_trait]
impl GatewayAdapter for AsaasAdapter {
    fn gateway(&self) -> Gateway {
        Gateway::Asaas
    }

    async fn create_charge(&self, req: &ChargeRequest) -> Result<ChargeReceipt, GatewayError> {
        let customer_id = self.ensure_customer(req).await?;
        let due_date = (Utc::now() + chrono::Duration::days(DUE_IN_DAYS))
            .date_naive()
            .to_string();

        let body = json!({
            "customer": customer_id,
            "billingType": Self::wire_method(req.payment_method),
            "value": Self::wire_value(req.amount.amount()),
            "dueDate": due_date,
            "externalReference": req.reference.to_string(),
            "description": "Enrollment payment",
        });

        let payment: AsaasPayment = self
            .request(
                self.client
                    .post(format!("{}/v3/payments", self.base_url))
                    .json(&body),
            )
            .await?;
        debug!(payment_id = %payment.id, status = %payment.status, "asaas charge created");

        Ok(ChargeReceipt {
            status: Self::map_status(&payment.status),
            provider_status: payment.status.clone(),
            checkout_url: payment.invoice_url.clone(),
            provider_token: None,
            payload: payment.raw(),
            external_id: payment.id,
        })
    }

    async fn query_status(&self, external_id: &str) -> Result<ProviderTruth, GatewayError> {
        let payment: AsaasPayment = self
            .request(
                self.client
                    .get(format!("{}/v3/payments/{external_id}", self.base_url)),
            )
            .await?;

        let status = Self::map_status(&payment.status);
        if status == PaymentStatus::Unknown {
            warn!(raw = %payment.status, "unmapped asaas payment status");
        }

        Ok(ProviderTruth {
            status,
            provider_status: payment.status.clone(),
            paid_amount: payment.paid_minor(status),
            payload: payment.raw(),
        })
    }

    async fn refund(
        &self,
        external_id: &str,
        amount: Option<i64>,
    ) -> Result<ProviderTruth, GatewayError> {
        let body = match amount {
            Some(minor) => json!({ "value": Self::wire_value(minor) }),
            None => json!({}),
        };

        let payment: AsaasPayment = self
            .request(
                self.client
                    .post(format!("{}/v3/payments/{external_id}/refund", self.base_url))
                    .json(&body),
            )
            .await?;

        Ok(ProviderTruth {
            status: Self::map_status(&payment.status),
            provider_status: payment.status.clone(),
            paid_amount: None,
            payload: payment.raw(),
        })
    }

    fn verify_and_parse_webhook(
        &self,
        raw_body: &[u8],
        signature_header: &str,
    ) -> Result<StatusEvent, GatewayError> {
        if !tokens_match(signature_header, &self.webhook_token) {
            return Err(GatewayError::Signature(
                "asaas-access-token mismatch".to_string(),
            ));
        }

        let event: AsaasEvent = serde_json::from_slice(raw_body)
            .map_err(|e| GatewayError::Malformed(format!("asaas event: {e}")))?;

        let status = Self::map_status(&event.payment.status);
        let paid_amount = event.payment.paid_minor(status);

        Ok(StatusEvent::new(
            Gateway::Asaas,
            event.payment.id.clone(),
            status,
            format!("{}:{}", event.event, event.payment.status),
            serde_json::from_slice(raw_body)
                .map_err(|e| GatewayError::Malformed(e.to_string()))?,
        )
        .with_paid_amount(paid_amount))
    }
}

#[derive(Debug, Deserialize)]
struct AsaasCustomer {
    id: String,
}

#[derive(Debug, Deserialize)]
struct AsaasPayment {
    id: String,
    status: String,
    #[serde(default)]
    value: Option<f64>,
    #[serde(default, rename = "invoiceUrl")]
    invoice_url: Option<String>,
}

impl AsaasPayment {
    fn paid_minor(&self, status: PaymentStatus) -> Option<i64> {
        if status != PaymentStatus::Paid {
            return None;
        }
        self.value.map(AsaasAdapter::minor_from_value)
    }

    fn raw(&self) -> Value {
        json!({ "id": self.id, "status": self.status, "value": self.value })
    }
}

#[derive(Debug, Deserialize)]
struct AsaasEvent {
    event: String,
    payment: AsaasPayment,
}

#[derive(Debug, Deserialize)]
struct AsaasErrors {
    #[serde(default)]
    errors: Vec<AsaasErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct AsaasErrorDetail {
    description: String,
}
