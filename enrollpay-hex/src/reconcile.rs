//! Reconciliation sweep.
//!
//! Webhooks get lost; the sweep periodically asks each provider for the
//! truth about stale settling records and pushes it through the same
//! compare-and-set path the webhooks use. Overlap with a late webhook is
//! safe by construction: whichever lands first wins, the other is a no-op.

use std::time::Duration;

use chrono::Utc;

use enrollpay_types::{
    AlertKind, AppError, EventSource, PaymentLedger, PaymentRecord, PaymentStatus, ReconcileReport,
    StatusEvent,
};

use crate::PaymentService;

#[derive(Debug, Clone, Copy)]
pub struct ReconcileSettings {
    /// Tick interval between sweeps.
    pub interval: Duration,
    /// Records untouched for at least this long are considered stale.
    pub grace: Duration,
    /// Per-tick batch cap, bounding provider API pressure.
    pub batch_limit: i64,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(120),
            grace: Duration::from_secs(300),
            batch_limit: 100,
        }
    }
}

/// Background worker driving periodic sweeps.
pub struct ReconciliationWorker<L: PaymentLedger> {
    service: PaymentService<L>,
    settings: ReconcileSettings,
}

impl<L: PaymentLedger> ReconciliationWorker<L> {
    pub fn new(service: PaymentService<L>, settings: ReconcileSettings) -> Self {
        Self { service, settings }
    }

    /// Runs forever; intended for `tokio::spawn`.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.settings.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(
            interval_secs = self.settings.interval.as_secs(),
            grace_secs = self.settings.grace.as_secs(),
            "reconciliation worker started"
        );

        loop {
            ticker.tick().await;
            match sweep_once(&self.service, self.settings).await {
                Ok(report) if report.examined > 0 => {
                    tracing::info!(
                        examined = report.examined,
                        applied = report.applied,
                        unchanged = report.unchanged,
                        provider_errors = report.provider_errors,
                        unknown_status = report.unknown_status,
                        "reconciliation sweep finished"
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(error = %e, "reconciliation sweep failed");
                }
            }
        }
    }
}

/// One reconciliation pass over stale settling records. Also backs the
/// admin's manual sweep endpoint.
#[tracing::instrument(skip(service, settings))]
pub async fn sweep_once<L: PaymentLedger>(
    service: &PaymentService<L>,
    settings: ReconcileSettings,
) -> Result<ReconcileReport, AppError> {
    let cutoff = Utc::now() - chrono::Duration::from_std(settings.grace).unwrap_or_default();
    let stale = service
        .ledger()
        .list_stale(cutoff, settings.batch_limit)
        .await?;

    let mut report = ReconcileReport::default();
    for record in stale {
        report.examined += 1;
        if let Err(e) = reconcile_record(service, &record, &mut report).await {
            // Logged and skipped; the record stays stale and the next tick
            // retries it.
            tracing::warn!(payment_id = %record.id, error = %e, "record reconciliation failed");
            report.provider_errors += 1;
        }
    }

    if report.provider_errors > 0 {
        service
            .notifier()
            .operator_alert(
                AlertKind::ProviderUnreachable,
                &format!(
                    "reconciliation sweep hit {} provider error(s) across {} record(s)",
                    report.provider_errors, report.examined
                ),
            )
            .await;
    }
    Ok(report)
}

async fn reconcile_record<L: PaymentLedger>(
    service: &PaymentService<L>,
    record: &PaymentRecord,
    report: &mut ReconcileReport,
) -> Result<(), AppError> {
    let external_id = record
        .external_id
        .as_deref()
        .ok_or_else(|| AppError::Internal("stale record without external id".into()))?;

    let creds = service
        .tenants()
        .gateway_credentials(record.school_id, record.gateway)
        .await?
        .ok_or_else(|| {
            AppError::Internal(format!(
                "No {} credentials for school {}",
                record.gateway, record.school_id
            ))
        })?;

    let adapter = service.adapters().adapter(record.gateway, &creds)?;
    let truth = adapter.query_status(external_id).await?;

    let event = StatusEvent::new(
        record.gateway,
        external_id,
        truth.status,
        truth.provider_status,
        truth.payload,
    )
    .with_paid_amount(truth.paid_amount);

    let outcome = service
        .apply_status_event(record, &event, EventSource::Reconciliation)
        .await?;

    if outcome.changed() {
        report.applied += 1;
        if outcome.record().status == PaymentStatus::Unknown {
            report.unknown_status += 1;
        }
    } else {
        report.unchanged += 1;
    }

    service.ledger().mark_reconciled(record.id, Utc::now()).await?;
    Ok(())
}
