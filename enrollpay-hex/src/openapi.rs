//! OpenAPI specification and documentation.

#![allow(dead_code)] // Path functions are only used by utoipa for documentation generation

use enrollpay_types::dto::{
    CreateIntentRequest, CreateIntentResponse, PaymentView, ReconcileReport, ReportRowView,
    ReportSummary,
};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
};

// Dummy functions to generate path documentation
// These are not the actual handlers, just for OpenAPI path generation

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is healthy", body = inline(serde_json::Value), example = json!({"status": "healthy"}))
    )
)]
async fn health() {}

/// Create a payment intent for an enrollment
#[utoipa::path(
    post,
    path = "/payments/intent",
    tag = "payments",
    request_body = CreateIntentRequest,
    responses(
        (status = 201, description = "Intent created", body = CreateIntentResponse),
        (status = 400, description = "Validation error"),
        (status = 404, description = "Enrollment not found"),
        (status = 409, description = "A non-terminal payment already exists for the enrollment"),
        (status = 502, description = "Payment provider unavailable")
    )
)]
async fn create_intent() {}

/// Get a normalized payment record
#[utoipa::path(
    get,
    path = "/payments/{id}",
    tag = "payments",
    params(
        ("id" = String, Path, description = "Payment ID (UUID)")
    ),
    responses(
        (status = 200, description = "Payment record", body = PaymentView),
        (status = 404, description = "Payment not found")
    )
)]
async fn get_payment() {}

/// Provider webhook endpoint (per tenant)
#[utoipa::path(
    post,
    path = "/payments/webhook/{gateway}/{school_id}",
    tag = "webhooks",
    params(
        ("gateway" = String, Path, description = "Provider: stripe | pagarme | asaas"),
        ("school_id" = String, Path, description = "Tenant school ID (UUID)")
    ),
    responses(
        (status = 200, description = "Event applied or duplicate no-op"),
        (status = 202, description = "No matching record yet; queued for retry"),
        (status = 400, description = "Unknown gateway or malformed payload"),
        (status = 401, description = "Signature verification failed")
    )
)]
async fn gateway_webhook() {}

/// Financial report grouped by school, status and day
#[utoipa::path(
    get,
    path = "/payments/report",
    tag = "admin",
    security(("admin_key" = [])),
    params(
        ("school_id" = Option<String>, Query, description = "Filter to one school"),
        ("from" = Option<String>, Query, description = "Window start (RFC 3339), default 30 days ago"),
        ("to" = Option<String>, Query, description = "Window end (RFC 3339), default now"),
        ("format" = Option<String>, Query, description = "json (default) or csv")
    ),
    responses(
        (status = 200, description = "Aggregated report", body = ReportSummary),
        (status = 400, description = "Unsupported format or invalid window"),
        (status = 401, description = "Missing or invalid admin key")
    )
)]
async fn financial_report() {}

/// Trigger a one-shot reconciliation sweep
#[utoipa::path(
    post,
    path = "/payments/reconcile",
    tag = "admin",
    security(("admin_key" = [])),
    responses(
        (status = 200, description = "Sweep outcome counts", body = ReconcileReport),
        (status = 401, description = "Missing or invalid admin key")
    )
)]
async fn reconcile_now() {}

struct AdminKeySecurity;

impl Modify for AdminKeySecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "admin_key",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("X-Admin-Key"))),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Enrollpay API",
        description = "Payment gateway abstraction and reconciliation for school enrollments",
        version = "0.1.0"
    ),
    paths(
        health,
        create_intent,
        get_payment,
        gateway_webhook,
        financial_report,
        reconcile_now
    ),
    components(schemas(
        CreateIntentRequest,
        CreateIntentResponse,
        PaymentView,
        ReportSummary,
        ReportRowView,
        ReconcileReport
    )),
    modifiers(&AdminKeySecurity),
    tags(
        (name = "payments", description = "Intent creation and record reads"),
        (name = "webhooks", description = "Provider status notifications"),
        (name = "admin", description = "Operator surfaces"),
        (name = "health", description = "Liveness")
    )
)]
pub struct ApiDoc;
