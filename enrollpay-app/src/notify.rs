//! Log-backed notifier.
//!
//! Student/school messaging (email, WhatsApp) is delivered by the wider
//! platform; this binary emits structured log events that the platform's
//! shipper picks up. Operator alerts land on the error level so they page.

use enrollpay_types::{AlertKind, Notifier, PaymentRecord};

pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn payment_confirmed(&self, record: &PaymentRecord) {
        tracing::info!(
            payment_id = %record.id,
            enrollment_id = %record.enrollment_id,
            school_id = %record.school_id,
            amount = %record.amount,
            "payment confirmed"
        );
    }

    async fn payment_failed(&self, record: &PaymentRecord) {
        tracing::info!(
            payment_id = %record.id,
            enrollment_id = %record.enrollment_id,
            school_id = %record.school_id,
            "payment failed"
        );
    }

    async fn operator_alert(&self, kind: AlertKind, detail: &str) {
        tracing::error!(alert = %kind, detail, "operator alert");
    }
}
