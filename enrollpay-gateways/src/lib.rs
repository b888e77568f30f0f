//! # Enrollpay Gateways
//!
//! Outbound adapters for the external payment providers. One module per
//! provider; each owns its status-vocabulary mapping and its webhook
//! signature scheme. Adapters are built per call from tenant credentials by
//! [`ProviderFactory`] - no client instance is ever shared across tenants,
//! and credential rotation takes effect on the next call.

use std::time::Duration;

use enrollpay_types::{AdapterFactory, Gateway, GatewayAdapter, GatewayCredentials, GatewayError};

pub mod asaas;
pub mod pagarme;
pub mod signature;
pub mod stripe;

pub use asaas::AsaasAdapter;
pub use pagarme::PagarmeAdapter;
pub use stripe::StripeAdapter;

/// Default bound on every provider call (creation and status queries).
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);

/// Builds provider adapters with a bounded request timeout.
pub struct ProviderFactory {
    timeout: Duration,
}

impl ProviderFactory {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for ProviderFactory {
    fn default() -> Self {
        Self::new(DEFAULT_PROVIDER_TIMEOUT)
    }
}

impl AdapterFactory for ProviderFactory {
    fn adapter(
        &self,
        gateway: Gateway,
        credentials: &GatewayCredentials,
    ) -> Result<Box<dyn GatewayAdapter>, GatewayError> {
        match gateway {
            Gateway::Stripe => Ok(Box::new(StripeAdapter::new(credentials, self.timeout)?)),
            Gateway::Pagarme => Ok(Box::new(PagarmeAdapter::new(credentials, self.timeout)?)),
            Gateway::Asaas => Ok(Box::new(AsaasAdapter::new(credentials, self.timeout)?)),
        }
    }
}

/// Shared HTTP client construction with the bounded timeout.
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, GatewayError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| GatewayError::Config(format!("Failed to build HTTP client: {e}")))
}

/// Maps a reqwest transport error into the gateway taxonomy. Timeouts and
/// connection failures are transient (`Unavailable`); reconciliation will
/// settle the record later.
pub(crate) fn transport_error(provider: &str, err: reqwest::Error) -> GatewayError {
    if err.is_timeout() || err.is_connect() {
        GatewayError::Unavailable(format!("{provider}: {err}"))
    } else {
        GatewayError::Rejected {
            provider: provider.to_string(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_credentials() -> GatewayCredentials {
        GatewayCredentials {
            api_key: "sk_test_key".to_string(),
            webhook_secret: "whsec_test".to_string(),
            sandbox: true,
        }
    }

    #[test]
    fn test_factory_builds_each_gateway() {
        let factory = ProviderFactory::default();
        for gateway in Gateway::ALL {
            let adapter = factory.adapter(gateway, &test_credentials()).unwrap();
            assert_eq!(adapter.gateway(), gateway);
        }
    }
}
