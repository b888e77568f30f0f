//! Gateway adapter port.
//!
//! One implementation per external payment provider. Adapters translate the
//! generic capability set into provider-specific API calls and normalize the
//! provider's status vocabulary at the boundary.

use serde_json::Value;

use super::tenant::GatewayCredentials;
use crate::domain::{CustomerInfo, Gateway, Money, PaymentId, PaymentMethod, StatusEvent};
use crate::error::GatewayError;

/// Charge creation request forwarded to a provider.
#[derive(Debug, Clone)]
pub struct ChargeRequest {
    /// Ledger row id, passed to the provider as our reference so webhook
    /// payloads can be correlated even before the external id is stored.
    pub reference: PaymentId,
    pub amount: Money,
    pub payment_method: PaymentMethod,
    pub customer: CustomerInfo,
    /// Echoed back by providers in webhooks.
    pub metadata: Value,
}

/// Provider response to charge creation.
#[derive(Debug, Clone)]
pub struct ChargeReceipt {
    pub external_id: String,
    pub status: crate::domain::PaymentStatus,
    /// The provider's own status word, kept for the audit trail.
    pub provider_status: String,
    /// Redirect URL for hosted checkout flows (bank slip, Pix page).
    pub checkout_url: Option<String>,
    /// Client-side token for embedded flows (card elements).
    pub provider_token: Option<String>,
    /// Raw provider payload for the audit trail.
    pub payload: Value,
}

/// Provider-reported truth for an existing charge.
#[derive(Debug, Clone)]
pub struct ProviderTruth {
    pub status: crate::domain::PaymentStatus,
    pub provider_status: String,
    pub paid_amount: Option<i64>,
    pub payload: Value,
}

/// Capability set implemented once per provider.
///
/// Adapters are stateless aside from the credentials they were built with;
/// they are constructed per call from tenant configuration so credential
/// rotation takes effect on the next call and no client instance is shared
/// across tenants.
#[async_trait::async_trait]
pub trait GatewayAdapter: Send + Sync {
    fn gateway(&self) -> Gateway;

    async fn create_charge(&self, req: &ChargeRequest) -> Result<ChargeReceipt, GatewayError>;

    async fn query_status(&self, external_id: &str) -> Result<ProviderTruth, GatewayError>;

    async fn refund(
        &self,
        external_id: &str,
        amount: Option<i64>,
    ) -> Result<ProviderTruth, GatewayError>;

    /// Verifies the provider signature over the EXACT raw bytes and parses
    /// the payload into a normalized event. On signature mismatch the
    /// ledger is never touched.
    fn verify_and_parse_webhook(
        &self,
        raw_body: &[u8],
        signature_header: &str,
    ) -> Result<StatusEvent, GatewayError>;
}

/// Builds adapters from per-tenant credentials at call time.
///
/// Injected so services never hold provider clients; multi-tenant isolation
/// is structural, not accidental.
pub trait AdapterFactory: Send + Sync {
    fn adapter(
        &self,
        gateway: Gateway,
        credentials: &GatewayCredentials,
    ) -> Result<Box<dyn GatewayAdapter>, GatewayError>;
}
