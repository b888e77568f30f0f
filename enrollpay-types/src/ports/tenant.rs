//! Tenant configuration port.

use crate::domain::{Gateway, SchoolId};
use crate::error::LedgerError;

/// Per-tenant, per-provider credentials. Read-only configuration, fetched
/// per call and never cached indefinitely by this subsystem.
#[derive(Debug, Clone)]
pub struct GatewayCredentials {
    pub api_key: String,
    pub webhook_secret: String,
    pub sandbox: bool,
}

/// Resolves provider credentials from tenant configuration storage
/// (an external collaborator; never hard-coded).
#[async_trait::async_trait]
pub trait TenantConfigStore: Send + Sync {
    async fn gateway_credentials(
        &self,
        school_id: SchoolId,
        gateway: Gateway,
    ) -> Result<Option<GatewayCredentials>, LedgerError>;
}
