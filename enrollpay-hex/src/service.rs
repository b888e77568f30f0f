//! Payment Application Service
//!
//! Orchestrates the payment lifecycle through the ledger and provider ports.
//! Contains NO infrastructure logic - pure business orchestration.

use std::sync::Arc;

use serde_json::json;

use enrollpay_types::{
    AdapterFactory, AlertKind, AppError, ChargeRequest, CreateIntentRequest, CreateIntentResponse,
    EnrollmentDirectory, EventSource, Expected, GatewayError, Money, NewPaymentRecord, Notifier,
    PaymentId, PaymentLedger, PaymentRecord, PaymentStatus, PaymentView, StatusEvent,
    TenantConfigStore, TransitionOutcome,
};

/// Application service for enrollment payments.
///
/// Generic over `L: PaymentLedger` - the ledger adapter is injected at
/// compile time. Provider adapters are built per call through the injected
/// factory from per-tenant credentials, so no provider client outlives a
/// request and credential rotation needs no restart.
pub struct PaymentService<L: PaymentLedger> {
    ledger: Arc<L>,
    adapters: Arc<dyn AdapterFactory>,
    tenants: Arc<dyn TenantConfigStore>,
    enrollments: Arc<dyn EnrollmentDirectory>,
    notifier: Arc<dyn Notifier>,
}

impl<L: PaymentLedger> Clone for PaymentService<L> {
    fn clone(&self) -> Self {
        Self {
            ledger: self.ledger.clone(),
            adapters: self.adapters.clone(),
            tenants: self.tenants.clone(),
            enrollments: self.enrollments.clone(),
            notifier: self.notifier.clone(),
        }
    }
}

impl<L: PaymentLedger> PaymentService<L> {
    pub fn new(
        ledger: Arc<L>,
        adapters: Arc<dyn AdapterFactory>,
        tenants: Arc<dyn TenantConfigStore>,
        enrollments: Arc<dyn EnrollmentDirectory>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            ledger,
            adapters,
            tenants,
            enrollments,
            notifier,
        }
    }

    /// Returns a reference to the underlying ledger.
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub(crate) fn tenants(&self) -> &dyn TenantConfigStore {
        self.tenants.as_ref()
    }

    pub(crate) fn adapters(&self) -> &dyn AdapterFactory {
        self.adapters.as_ref()
    }

    pub(crate) fn notifier(&self) -> &dyn Notifier {
        self.notifier.as_ref()
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Intent creation
    // ─────────────────────────────────────────────────────────────────────────────

    /// Creates a payment intent: a `Pending` ledger row plus a provider
    /// charge.
    ///
    /// The row is inserted BEFORE the provider call so a crash between the
    /// two leaves a record that reconciliation or an operator can settle; it
    /// is never re-derived from provider data.
    #[tracing::instrument(skip(self, req), fields(enrollment_id = %req.enrollment_id, gateway = %req.gateway))]
    pub async fn create_intent(
        &self,
        req: CreateIntentRequest,
    ) -> Result<CreateIntentResponse, AppError> {
        if req.amount <= 0 {
            return Err(AppError::BadRequest("Amount must be positive".into()));
        }
        let amount = Money::new(req.amount, req.currency)?;

        let enrollment = self
            .enrollments
            .get(req.enrollment_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Enrollment {}", req.enrollment_id)))?;

        if let Some(existing) = self
            .ledger
            .find_active_for_enrollment(req.enrollment_id)
            .await?
        {
            return Err(AppError::DuplicateIntent(format!(
                "Enrollment {} already has payment {} in status {}",
                req.enrollment_id, existing.id, existing.status
            )));
        }

        let creds = self
            .tenants
            .gateway_credentials(enrollment.school_id, req.gateway)
            .await?
            .ok_or_else(|| {
                AppError::BadRequest(format!(
                    "Gateway {} is not configured for school {}",
                    req.gateway, enrollment.school_id
                ))
            })?;

        let record = self
            .ledger
            .create(NewPaymentRecord {
                gateway: req.gateway,
                enrollment_id: enrollment.id,
                school_id: enrollment.school_id,
                student_id: enrollment.student_id,
                amount,
                payment_method: req.payment_method,
                metadata: req.metadata.clone().unwrap_or_else(|| json!({})),
            })
            .await?;

        let adapter = self.adapters.adapter(req.gateway, &creds)?;
        let charge = ChargeRequest {
            reference: record.id,
            amount,
            payment_method: req.payment_method,
            customer: req.customer.clone(),
            metadata: req.metadata.unwrap_or_else(|| json!({})),
        };

        match adapter.create_charge(&charge).await {
            Ok(receipt) => {
                self.ledger
                    .assign_external_id(record.id, &receipt.external_id)
                    .await?;

                // Some providers answer already settling (e.g. an instant
                // card capture). Mirror that through the same path webhooks
                // take so side effects fire here and the later webhook for
                // the same status is a replay.
                let mut status = PaymentStatus::Pending;
                if receipt.status != PaymentStatus::Pending {
                    let event = StatusEvent::new(
                        req.gateway,
                        receipt.external_id.clone(),
                        receipt.status,
                        receipt.provider_status.clone(),
                        receipt.payload.clone(),
                    );
                    status = self
                        .apply_status_event(&record, &event, EventSource::Manual)
                        .await?
                        .record()
                        .status;
                }

                tracing::info!(payment_id = %record.id, external_id = %receipt.external_id, "payment intent created");
                Ok(CreateIntentResponse {
                    payment_id: record.id,
                    status,
                    checkout_url: receipt.checkout_url,
                    provider_token: receipt.provider_token,
                })
            }
            Err(GatewayError::Unavailable(msg)) => {
                // Transient: the row stays Pending with no external id so an
                // operator (or a fresh intent after remediation) can settle it.
                tracing::warn!(payment_id = %record.id, error = %msg, "provider unreachable during intent creation");
                self.ledger
                    .merge_metadata(record.id, json!({ "gateway_error": msg }))
                    .await?;
                Err(AppError::ProviderUnavailable(
                    "Payment provider is unavailable, please retry later".into(),
                ))
            }
            Err(e) => {
                tracing::warn!(payment_id = %record.id, error = %e, "provider rejected charge creation");
                self.ledger
                    .merge_metadata(record.id, json!({ "gateway_error": e.to_string() }))
                    .await?;
                self.ledger
                    .transition(
                        record.id,
                        Expected::Status(PaymentStatus::Pending),
                        PaymentStatus::Failed,
                        EventSource::Manual,
                    )
                    .await?;
                Err(e.into())
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Record reads
    // ─────────────────────────────────────────────────────────────────────────────

    /// Fetches the normalized payment view. `include_external` is true for
    /// admin callers only.
    pub async fn get_payment(
        &self,
        id: PaymentId,
        include_external: bool,
    ) -> Result<PaymentView, AppError> {
        let record = self
            .ledger
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Payment {id}")))?;
        Ok(PaymentView::from_record(&record, include_external))
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Status-event application
    // ─────────────────────────────────────────────────────────────────────────────

    /// Applies a normalized provider event to a ledger record. The single
    /// convergence point for webhooks and reconciliation.
    ///
    /// Side effects (enrollment write-back, notifications, operator alerts)
    /// fire only when the compare-and-set actually changed state, so
    /// replayed or racing events never re-fire them.
    pub async fn apply_status_event(
        &self,
        record: &PaymentRecord,
        event: &StatusEvent,
        source: EventSource,
    ) -> Result<TransitionOutcome, AppError> {
        let current = record.status;

        if current == event.status {
            tracing::debug!(payment_id = %record.id, status = %current, "status event replay, nothing to do");
            return Ok(TransitionOutcome::NoOp(record.clone()));
        }

        // Out-of-order or stale events (e.g. a delayed `processing` after
        // `paid`) are dropped as no-ops, not errors.
        if !event.force && !current.can_transition_to(event.status) {
            tracing::warn!(
                payment_id = %record.id, from = %current, to = %event.status,
                provider_status = %event.provider_status,
                "unreachable status transition requested, ignoring"
            );
            return Ok(TransitionOutcome::NoOp(record.clone()));
        }

        let expected = if event.force {
            Expected::Any
        } else {
            Expected::Status(current)
        };

        let outcome = self
            .ledger
            .transition(record.id, expected, event.status, source)
            .await?;

        if outcome.changed() {
            self.ledger
                .merge_metadata(
                    record.id,
                    json!({
                        "last_provider_status": event.provider_status,
                        "last_event_source": source.as_ref(),
                    }),
                )
                .await?;
            self.dispatch_side_effects(outcome.record(), event).await;
        }

        Ok(outcome)
    }

    async fn dispatch_side_effects(&self, record: &PaymentRecord, event: &StatusEvent) {
        // Enrollment write-back and notifications are best-effort; a
        // downstream failure must not roll back the ledger.
        match record.status {
            PaymentStatus::Paid => {
                if let Err(e) = self
                    .enrollments
                    .set_payment_status(record.enrollment_id, record.status)
                    .await
                {
                    tracing::error!(payment_id = %record.id, error = %e, "enrollment write-back failed");
                }
                self.notifier.payment_confirmed(record).await;
            }
            PaymentStatus::Failed => {
                if let Err(e) = self
                    .enrollments
                    .set_payment_status(record.enrollment_id, record.status)
                    .await
                {
                    tracing::error!(payment_id = %record.id, error = %e, "enrollment write-back failed");
                }
                self.notifier.payment_failed(record).await;
            }
            PaymentStatus::Canceled | PaymentStatus::Refunded => {
                if let Err(e) = self
                    .enrollments
                    .set_payment_status(record.enrollment_id, record.status)
                    .await
                {
                    tracing::error!(payment_id = %record.id, error = %e, "enrollment write-back failed");
                }
            }
            PaymentStatus::Unknown => {
                tracing::error!(
                    payment_id = %record.id, provider_status = %event.provider_status,
                    "payment parked in unknown status"
                );
                self.notifier
                    .operator_alert(
                        AlertKind::UnknownProviderStatus,
                        &format!(
                            "payment {} received unmapped provider status {:?}",
                            record.id, event.provider_status
                        ),
                    )
                    .await;
            }
            PaymentStatus::Pending | PaymentStatus::Processing => {}
        }
    }
}
