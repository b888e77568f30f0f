//! Normalized provider status events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::payment::Gateway;
use super::status::PaymentStatus;

/// Where a transition attempt came from. Persisted with the transition for
/// the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    Webhook,
    Reconciliation,
    Manual,
}

impl AsRef<str> for EventSource {
    fn as_ref(&self) -> &str {
        match self {
            EventSource::Webhook => "webhook",
            EventSource::Reconciliation => "reconciliation",
            EventSource::Manual => "manual",
        }
    }
}

impl std::fmt::Display for EventSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}

/// A provider notification normalized at the adapter boundary.
///
/// Raw provider shapes never leave the adapter: webhook payloads are parsed
/// into this closed type immediately after signature verification, so the
/// rest of the system handles one vocabulary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEvent {
    pub gateway: Gateway,
    /// Provider transaction id the event refers to.
    pub external_id: String,
    /// Normalized status; `Unknown` when the provider vocabulary missed.
    pub status: PaymentStatus,
    /// The provider status string as received, kept for audit and for
    /// diagnosing vocabulary drift.
    pub provider_status: String,
    /// Amount the provider reports as settled, in minor units.
    pub paid_amount: Option<i64>,
    pub occurred_at: Option<DateTime<Utc>>,
    /// Full provider payload for the audit trail.
    pub payload: serde_json::Value,
    /// Set exclusively by manual admin remediation; bypasses the
    /// reachability check (not the atomicity of the transition).
    #[serde(default)]
    pub force: bool,
}

impl StatusEvent {
    pub fn new(
        gateway: Gateway,
        external_id: impl Into<String>,
        status: PaymentStatus,
        provider_status: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            gateway,
            external_id: external_id.into(),
            status,
            provider_status: provider_status.into(),
            paid_amount: None,
            occurred_at: None,
            payload,
            force: false,
        }
    }

    pub fn with_paid_amount(mut self, amount: Option<i64>) -> Self {
        self.paid_amount = amount;
        self
    }

    pub fn with_occurred_at(mut self, at: Option<DateTime<Utc>>) -> Self {
        self.occurred_at = at;
        self
    }
}
