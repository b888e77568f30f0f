//! Payment record domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::money::Money;
use super::status::PaymentStatus;

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema,
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random id.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an id from an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

uuid_id! {
    /// Unique identifier for a PaymentRecord. Internal identity, stable.
    PaymentId
}
uuid_id! {
    /// Reference to an enrollment owned outside this core.
    EnrollmentId
}
uuid_id! {
    /// Reference to a school (tenant).
    SchoolId
}
uuid_id! {
    /// Reference to a student.
    StudentId
}

/// External payment provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Gateway {
    Stripe,
    Pagarme,
    Asaas,
}

impl Gateway {
    pub const ALL: [Gateway; 3] = [Gateway::Stripe, Gateway::Pagarme, Gateway::Asaas];
}

impl AsRef<str> for Gateway {
    fn as_ref(&self) -> &str {
        match self {
            Gateway::Stripe => "stripe",
            Gateway::Pagarme => "pagarme",
            Gateway::Asaas => "asaas",
        }
    }
}

impl std::fmt::Display for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}

impl std::str::FromStr for Gateway {
    type Err = crate::error::DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stripe" => Ok(Gateway::Stripe),
            "pagarme" => Ok(Gateway::Pagarme),
            "asaas" => Ok(Gateway::Asaas),
            other => Err(crate::error::DomainError::Validation(format!(
                "Unknown gateway: {other}"
            ))),
        }
    }
}

/// How the student pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Card,
    BankSlip,
    InstantTransfer,
    Other,
}

impl AsRef<str> for PaymentMethod {
    fn as_ref(&self) -> &str {
        match self {
            PaymentMethod::Card => "card",
            PaymentMethod::BankSlip => "bank_slip",
            PaymentMethod::InstantTransfer => "instant_transfer",
            PaymentMethod::Other => "other",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = crate::error::DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "card" => Ok(PaymentMethod::Card),
            "bank_slip" => Ok(PaymentMethod::BankSlip),
            "instant_transfer" => Ok(PaymentMethod::InstantTransfer),
            "other" => Ok(PaymentMethod::Other),
            other => Err(crate::error::DomainError::Validation(format!(
                "Unknown payment method: {other}"
            ))),
        }
    }
}

/// Customer details forwarded to the provider at charge creation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CustomerInfo {
    pub name: String,
    pub email: String,
    /// Tax document (CPF/CNPJ) where the provider requires one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
}

/// The central ledger entity: one charge attempt against one provider.
///
/// Records are append-only. A new attempt after `failed`/`canceled`
/// supersedes the old record rather than mutating it. `amount` and
/// `currency` are immutable after creation; `status` moves only through the
/// ledger's compare-and-set transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: PaymentId,
    /// Provider-assigned transaction id; unique per `(gateway, external_id)`
    /// once assigned. `None` only between intent creation and the provider
    /// response.
    pub external_id: Option<String>,
    pub gateway: Gateway,
    pub enrollment_id: EnrollmentId,
    pub school_id: SchoolId,
    pub student_id: StudentId,
    pub amount: Money,
    pub status: PaymentStatus,
    pub payment_method: PaymentMethod,
    /// Opaque bag supplied at creation and echoed by providers; also holds
    /// captured provider error detail for support/audit.
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_reconciled_at: Option<DateTime<Utc>>,
}

impl PaymentRecord {
    /// Reconstructs a record from database fields.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: PaymentId,
        external_id: Option<String>,
        gateway: Gateway,
        enrollment_id: EnrollmentId,
        school_id: SchoolId,
        student_id: StudentId,
        amount: Money,
        status: PaymentStatus,
        payment_method: PaymentMethod,
        metadata: serde_json::Value,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        completed_at: Option<DateTime<Utc>>,
        last_reconciled_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            external_id,
            gateway,
            enrollment_id,
            school_id,
            student_id,
            amount,
            status,
            payment_method,
            metadata,
            created_at,
            updated_at,
            completed_at,
            last_reconciled_at,
        }
    }
}
