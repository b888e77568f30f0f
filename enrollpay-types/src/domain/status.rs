//! Payment status machine.
//!
//! One explicit enum plus one reachability table, replacing ad hoc
//! provider-string comparisons. `Unknown` is a first-class state for
//! provider-vocabulary misses; it is surfaced, never coerced to `Pending`.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Normalized payment status.
///
/// Core graph: `Pending → Processing → {Paid, Failed, Canceled}`,
/// `Paid → Refunded`. Providers may settle without an intermediate
/// `Processing` notification, so `Pending` also reaches the settled states
/// directly. Any state can drop to `Unknown` on a mapping miss; `Unknown`
/// resolves to a settled state (or back to `Processing`) via reconciliation
/// or manual remediation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Paid,
    Failed,
    Canceled,
    Refunded,
    Unknown,
}

impl PaymentStatus {
    /// True for states where no further provider activity is expected.
    ///
    /// `Paid` is terminal for the enrollment funnel but not for the record
    /// (a refund is still possible), so it is not listed here.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Failed | PaymentStatus::Canceled | PaymentStatus::Refunded
        )
    }

    /// True for states the reconciliation job still needs to chase.
    pub fn is_settling(&self) -> bool {
        matches!(self, PaymentStatus::Pending | PaymentStatus::Processing)
    }

    /// Whether `target` is reachable from `self` in one transition.
    pub fn can_transition_to(&self, target: PaymentStatus) -> bool {
        use PaymentStatus::*;
        if *self == target {
            return false;
        }
        // Mapping misses may park any record in Unknown.
        if target == Unknown {
            return true;
        }
        match self {
            Pending => matches!(target, Processing | Paid | Failed | Canceled),
            Processing => matches!(target, Paid | Failed | Canceled),
            Paid => matches!(target, Refunded),
            Unknown => matches!(target, Processing | Paid | Failed | Canceled | Refunded),
            Failed | Canceled | Refunded => false,
        }
    }
}

impl AsRef<str> for PaymentStatus {
    fn as_ref(&self) -> &str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Processing => "processing",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Canceled => "canceled",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = crate::error::DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "processing" => Ok(PaymentStatus::Processing),
            "paid" => Ok(PaymentStatus::Paid),
            "failed" => Ok(PaymentStatus::Failed),
            "canceled" => Ok(PaymentStatus::Canceled),
            "refunded" => Ok(PaymentStatus::Refunded),
            "unknown" => Ok(PaymentStatus::Unknown),
            other => Err(crate::error::DomainError::Validation(format!(
                "Unrecognized payment status: {other}"
            ))),
        }
    }
}
