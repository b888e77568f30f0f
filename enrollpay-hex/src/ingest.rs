//! Webhook ingestion.
//!
//! Signature verification happens against per-tenant secrets before the
//! ledger is touched. Events that arrive before the external id was stored
//! (the provider can fire faster than our `assign_external_id` write) are
//! retried on a short schedule before being declared orphans.

use std::time::Duration;

use enrollpay_types::{
    AlertKind, AppError, EventSource, Gateway, GatewayError, PaymentLedger, SchoolId, StatusEvent,
};

use crate::PaymentService;

/// Bounded retry schedule for events whose ledger record is not yet visible.
#[derive(Debug, Clone, Copy)]
pub struct OrphanPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for OrphanPolicy {
    fn default() -> Self {
        // ~30 seconds total, enough to cover the assign_external_id race.
        Self {
            attempts: 6,
            delay: Duration::from_secs(5),
        }
    }
}

/// How a verified webhook was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Transition applied, side effects fired.
    Applied,
    /// Duplicate or stale event; ledger already past it.
    NoOp,
    /// No matching record yet; queued for bounded retry.
    Queued,
}

impl<L: PaymentLedger> PaymentService<L> {
    /// Verifies and applies one webhook delivery.
    ///
    /// On any signature failure the ledger is untouched, the raw body is
    /// never parsed further, and an operator alert fires.
    #[tracing::instrument(skip(self, raw_body, signature_header), fields(gateway = %gateway, school_id = %school_id))]
    pub async fn ingest_webhook(
        &self,
        gateway: Gateway,
        school_id: SchoolId,
        raw_body: &[u8],
        signature_header: &str,
        policy: OrphanPolicy,
    ) -> Result<IngestOutcome, AppError> {
        let creds = self
            .tenants()
            .gateway_credentials(school_id, gateway)
            .await?
            .ok_or_else(|| {
                AppError::Unauthorized(format!(
                    "No {gateway} credentials configured for school {school_id}"
                ))
            })?;

        let adapter = self.adapters().adapter(gateway, &creds)?;
        let event = match adapter.verify_and_parse_webhook(raw_body, signature_header) {
            Ok(event) => event,
            Err(e @ GatewayError::Signature(_)) => {
                tracing::warn!(error = %e, "webhook signature rejected");
                self.notifier()
                    .operator_alert(
                        AlertKind::SignatureRejected,
                        &format!("{gateway} webhook for school {school_id}: {e}"),
                    )
                    .await;
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        };

        match self.ledger().find_by_external(gateway, &event.external_id).await? {
            Some(record) => {
                if record.school_id != school_id {
                    // A tenant's endpoint referencing another tenant's
                    // payment is never legitimate.
                    tracing::error!(
                        payment_id = %record.id, expected_school = %record.school_id,
                        "webhook tenant mismatch"
                    );
                    self.notifier()
                        .operator_alert(
                            AlertKind::SignatureRejected,
                            &format!(
                                "{gateway} webhook for school {school_id} referenced payment {} of another school",
                                record.id
                            ),
                        )
                        .await;
                    return Err(AppError::NotFound(format!(
                        "Payment for external id {}",
                        event.external_id
                    )));
                }

                let outcome = self
                    .apply_status_event(&record, &event, EventSource::Webhook)
                    .await?;
                Ok(if outcome.changed() {
                    IngestOutcome::Applied
                } else {
                    IngestOutcome::NoOp
                })
            }
            None => {
                tracing::info!(
                    external_id = %event.external_id,
                    "webhook arrived before ledger record, scheduling retry"
                );
                let service = self.clone();
                tokio::spawn(async move {
                    service.retry_orphan(school_id, event, policy).await;
                });
                Ok(IngestOutcome::Queued)
            }
        }
    }

    /// Retries the record lookup on a fixed schedule; declares the event an
    /// orphan when the budget runs out. Orphans are loud: full payload in the
    /// log plus an operator alert, never a silent drop.
    async fn retry_orphan(&self, school_id: SchoolId, event: StatusEvent, policy: OrphanPolicy) {
        for attempt in 1..=policy.attempts {
            tokio::time::sleep(policy.delay).await;

            match self
                .ledger()
                .find_by_external(event.gateway, &event.external_id)
                .await
            {
                Ok(Some(record)) if record.school_id == school_id => {
                    match self
                        .apply_status_event(&record, &event, EventSource::Webhook)
                        .await
                    {
                        Ok(outcome) => {
                            tracing::info!(
                                payment_id = %record.id, attempt,
                                applied = outcome.changed(),
                                "queued webhook resolved"
                            );
                        }
                        Err(e) => {
                            tracing::error!(payment_id = %record.id, error = %e, "queued webhook failed to apply");
                        }
                    }
                    return;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "orphan retry lookup failed");
                }
            }
        }

        tracing::error!(
            gateway = %event.gateway,
            external_id = %event.external_id,
            provider_status = %event.provider_status,
            payload = %event.payload,
            "orphan webhook: no matching payment record after retries"
        );
        self.notifier()
            .operator_alert(
                AlertKind::OrphanWebhook,
                &format!(
                    "{} event for external id {} (school {}) matched no payment record",
                    event.gateway, event.external_id, school_id
                ),
            )
            .await;
    }
}
