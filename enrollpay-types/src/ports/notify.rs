//! Notification port.
//!
//! Downstream side effects (student/school notifications, operator alerts)
//! are dispatched only after a transition is confirmed to have changed
//! state, so replayed webhooks never re-fire them.

use crate::domain::PaymentRecord;

/// Operator-facing alert categories. Each of these marks a condition that
/// must leave a trace; none is ever silently dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    SignatureRejected,
    OrphanWebhook,
    UnknownProviderStatus,
    ProviderUnreachable,
}

impl AsRef<str> for AlertKind {
    fn as_ref(&self) -> &str {
        match self {
            AlertKind::SignatureRejected => "signature_rejected",
            AlertKind::OrphanWebhook => "orphan_webhook",
            AlertKind::UnknownProviderStatus => "unknown_provider_status",
            AlertKind::ProviderUnreachable => "provider_unreachable",
        }
    }
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}

/// Delivery is best-effort; failures are logged by implementations, never
/// propagated into the ledger path.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn payment_confirmed(&self, record: &PaymentRecord);

    async fn payment_failed(&self, record: &PaymentRecord);

    async fn operator_alert(&self, kind: AlertKind, detail: &str);
}
