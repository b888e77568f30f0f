//! Enrollment directory port.
//!
//! Enrollment CRUD and funnel bookkeeping live outside this core; the
//! payment subsystem only needs existence checks and the payment-status
//! field write-back.

use crate::domain::{EnrollmentId, PaymentStatus, SchoolId, StudentId};
use crate::error::LedgerError;

/// Minimal view of an enrollment owned by the wider platform.
#[derive(Debug, Clone)]
pub struct EnrollmentRef {
    pub id: EnrollmentId,
    pub school_id: SchoolId,
    pub student_id: StudentId,
}

#[async_trait::async_trait]
pub trait EnrollmentDirectory: Send + Sync {
    async fn get(&self, id: EnrollmentId) -> Result<Option<EnrollmentRef>, LedgerError>;

    /// Mirrors the confirmed payment status onto the enrollment record.
    async fn set_payment_status(
        &self,
        id: EnrollmentId,
        status: PaymentStatus,
    ) -> Result<(), LedgerError>;
}
