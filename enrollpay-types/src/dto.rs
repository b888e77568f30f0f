//! Data Transfer Objects (DTOs) for requests and responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{
    Currency, CustomerInfo, EnrollmentId, Gateway, PaymentId, PaymentMethod, PaymentRecord,
    PaymentStatus, SchoolId, StudentId,
};

// ─────────────────────────────────────────────────────────────────────────────
// Intent DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Request to create a payment intent for an enrollment.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateIntentRequest {
    pub enrollment_id: EnrollmentId,
    /// Amount in smallest currency unit (centavos/cents), strictly positive.
    #[schema(example = 125000)]
    pub amount: i64,
    pub currency: Currency,
    pub gateway: Gateway,
    pub payment_method: PaymentMethod,
    pub customer: CustomerInfo,
    /// Opaque bag echoed by the provider in webhooks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Response after creating a payment intent.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateIntentResponse {
    pub payment_id: PaymentId,
    pub status: PaymentStatus,
    /// Redirect URL for hosted checkout flows.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_url: Option<String>,
    /// Client token for embedded card flows.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_token: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Record views
// ─────────────────────────────────────────────────────────────────────────────

/// Normalized payment record as exposed over HTTP.
///
/// The provider transaction id is included only for admin callers.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaymentView {
    pub id: PaymentId,
    pub gateway: Gateway,
    pub enrollment_id: EnrollmentId,
    pub school_id: SchoolId,
    pub student_id: StudentId,
    /// Amount in smallest currency unit.
    pub amount: i64,
    pub currency: Currency,
    pub status: PaymentStatus,
    pub payment_method: PaymentMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_reconciled_at: Option<DateTime<Utc>>,
}

impl PaymentView {
    /// Builds the HTTP view; `include_external` is true for admin callers
    /// only. Internal metadata (provider error codes) is never exposed.
    pub fn from_record(record: &PaymentRecord, include_external: bool) -> Self {
        Self {
            id: record.id,
            gateway: record.gateway,
            enrollment_id: record.enrollment_id,
            school_id: record.school_id,
            student_id: record.student_id,
            amount: record.amount.amount(),
            currency: record.amount.currency(),
            status: record.status,
            payment_method: record.payment_method,
            external_id: if include_external {
                record.external_id.clone()
            } else {
                None
            },
            created_at: record.created_at,
            updated_at: record.updated_at,
            completed_at: record.completed_at,
            last_reconciled_at: record.last_reconciled_at,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Report DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// One aggregated ledger bucket: (school, status, day).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReportRow {
    pub school_id: SchoolId,
    pub status: PaymentStatus,
    /// Day bucket, ISO date.
    pub day: chrono::NaiveDate,
    pub currency: Currency,
    pub count: i64,
    /// Sum in smallest currency unit.
    pub total_minor: i64,
}

/// Rolled-up report as returned by the aggregator.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReportSummary {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub rows: Vec<ReportRowView>,
    /// Grand total of `paid` buckets in smallest currency unit.
    pub paid_total_minor: i64,
    pub paid_count: i64,
}

/// Report row with the display-unit conversion applied.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReportRowView {
    pub school_id: SchoolId,
    pub status: PaymentStatus,
    pub day: chrono::NaiveDate,
    pub currency: Currency,
    pub count: i64,
    pub total_minor: i64,
    /// Major-unit decimal string, e.g. "1250.00".
    #[schema(example = "1250.00")]
    pub total_display: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Reconciliation DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome counts of one reconciliation sweep.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ReconcileReport {
    /// Stale records examined this sweep.
    pub examined: u64,
    /// Transitions actually applied.
    pub applied: u64,
    /// Compare-and-set no-ops (webhook won the race, or nothing changed).
    pub unchanged: u64,
    /// Records whose provider could not be reached; retried next sweep.
    pub provider_errors: u64,
    /// Records parked in `unknown` pending operator attention.
    pub unknown_status: u64,
}
