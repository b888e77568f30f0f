//! Payment ledger port.
//!
//! The ledger is the durable source of truth for payment state. Its
//! `transition` operation is the single synchronization point of the whole
//! subsystem: webhooks and reconciliation both converge on it.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::domain::{
    EnrollmentId, EventSource, Gateway, Money, PaymentId, PaymentMethod, PaymentRecord,
    PaymentStatus, SchoolId, StudentId,
};
use crate::dto::ReportRow;
use crate::error::LedgerError;

/// Fields for a new ledger row. Created in `Pending`; the external id is
/// assigned in a follow-up update once the provider answers.
#[derive(Debug, Clone)]
pub struct NewPaymentRecord {
    pub gateway: Gateway,
    pub enrollment_id: EnrollmentId,
    pub school_id: SchoolId,
    pub student_id: StudentId,
    pub amount: Money,
    pub payment_method: PaymentMethod,
    pub metadata: Value,
}

/// Expected current status for a compare-and-set transition.
///
/// `Any` is reserved for forced manual remediation; every automated path
/// names the exact status it observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expected {
    Status(PaymentStatus),
    Any,
}

/// Result of a transition attempt. Never a hard failure for a benign race:
/// a compare-and-set miss is reported as `NoOp` with the current row.
#[derive(Debug, Clone)]
pub enum TransitionOutcome {
    /// The stored status matched and was replaced. Side effects may fire.
    Applied(PaymentRecord),
    /// The stored status did not match (or already equals the target);
    /// nothing changed. Side effects must NOT fire.
    NoOp(PaymentRecord),
}

impl TransitionOutcome {
    /// True when the transition actually changed state.
    pub fn changed(&self) -> bool {
        matches!(self, TransitionOutcome::Applied(_))
    }

    /// The record as stored after the attempt, applied or not.
    pub fn record(&self) -> &PaymentRecord {
        match self {
            TransitionOutcome::Applied(r) | TransitionOutcome::NoOp(r) => r,
        }
    }

    pub fn into_record(self) -> PaymentRecord {
        match self {
            TransitionOutcome::Applied(r) | TransitionOutcome::NoOp(r) => r,
        }
    }
}

/// Persistence boundary for `PaymentRecord`s.
///
/// Implementations must guarantee `(gateway, external_id)` uniqueness and
/// make `transition` atomic (`UPDATE ... WHERE status = expected` or an
/// equivalent row-level transaction).
#[async_trait::async_trait]
pub trait PaymentLedger: Send + Sync + 'static {
    /// Inserts a new record in `Pending`.
    async fn create(&self, new: NewPaymentRecord) -> Result<PaymentRecord, LedgerError>;

    /// Writes the provider-assigned id onto an existing row. Keyed by the
    /// ledger row, never re-derived. `Conflict` if the `(gateway,
    /// external_id)` pair already belongs to another record.
    async fn assign_external_id(
        &self,
        id: PaymentId,
        external_id: &str,
    ) -> Result<(), LedgerError>;

    async fn get(&self, id: PaymentId) -> Result<Option<PaymentRecord>, LedgerError>;

    async fn find_by_external(
        &self,
        gateway: Gateway,
        external_id: &str,
    ) -> Result<Option<PaymentRecord>, LedgerError>;

    /// The record (if any) holding the enrollment's current attempt: a row
    /// whose status is neither terminal nor superseded.
    async fn find_active_for_enrollment(
        &self,
        enrollment_id: EnrollmentId,
    ) -> Result<Option<PaymentRecord>, LedgerError>;

    /// Atomic compare-and-set status update; the idempotency primitive used
    /// by both the webhook path and reconciliation.
    ///
    /// Sets `completed_at` when the new status is `Paid` and it was unset.
    async fn transition(
        &self,
        id: PaymentId,
        expected: Expected,
        new_status: PaymentStatus,
        source: EventSource,
    ) -> Result<TransitionOutcome, LedgerError>;

    /// Shallow-merges `patch` into the record's metadata bag (adapter error
    /// capture, provider payload snippets).
    async fn merge_metadata(&self, id: PaymentId, patch: Value) -> Result<(), LedgerError>;

    /// `Pending`/`Processing` rows last touched before `older_than`, oldest
    /// first, for the reconciliation sweep.
    async fn list_stale(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<PaymentRecord>, LedgerError>;

    async fn mark_reconciled(&self, id: PaymentId, at: DateTime<Utc>) -> Result<(), LedgerError>;

    /// Read-side rollup: count and sum grouped by (school, status, day).
    /// Snapshot-consistent; tolerates concurrent writes.
    async fn report_rows(
        &self,
        school_id: Option<SchoolId>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ReportRow>, LedgerError>;
}
