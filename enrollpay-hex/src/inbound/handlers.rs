//! HTTP request handlers.

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use enrollpay_types::{
    AppError, Gateway, PaymentId, PaymentLedger, SchoolId,
};

use crate::ingest::{IngestOutcome, OrphanPolicy};
use crate::reconcile::{self, ReconcileSettings};
use crate::report::{self, ReportFormat};
use crate::PaymentService;

use super::auth;

/// Application state shared across handlers.
pub struct AppState<L: PaymentLedger> {
    pub service: PaymentService<L>,
    pub admin_key: String,
    pub orphan_policy: OrphanPolicy,
    pub reconcile: ReconcileSettings,
}

/// Wrapper to implement IntoResponse for AppError (orphan rule workaround).
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::DuplicateIntent(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::ProviderUnavailable(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message,
            "code": status.as_u16()
        });

        (status, Json(body)).into_response()
    }
}

/// Health check endpoint.
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy" }))
}

/// Create a payment intent.
#[tracing::instrument(skip(state, req), fields(enrollment_id = %req.enrollment_id))]
pub async fn create_intent<L: PaymentLedger>(
    State(state): State<Arc<AppState<L>>>,
    Json(req): Json<enrollpay_types::CreateIntentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let response = state.service.create_intent(req).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Get a payment record by id. `external_id` appears only for admin callers.
#[tracing::instrument(skip(state, headers), fields(payment_id = %id))]
pub async fn get_payment<L: PaymentLedger>(
    State(state): State<Arc<AppState<L>>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let payment_id: PaymentId = id
        .parse()
        .map_err(|_| AppError::BadRequest("Invalid payment ID".into()))?;

    let include_external = auth::is_admin(&headers, &state.admin_key);
    let view = state.service.get_payment(payment_id, include_external).await?;
    Ok(Json(view))
}

/// Which header each provider signs into.
fn signature_header_name(gateway: Gateway) -> &'static str {
    match gateway {
        Gateway::Stripe => "Stripe-Signature",
        Gateway::Pagarme => "X-Hub-Signature",
        Gateway::Asaas => "asaas-access-token",
    }
}

/// Provider webhook endpoint. The URL carries the tenant: per-tenant
/// endpoints are what gets registered in each provider dashboard, and the
/// signing secret is only known once the tenant is.
#[tracing::instrument(skip(state, headers, body))]
pub async fn gateway_webhook<L: PaymentLedger>(
    State(state): State<Arc<AppState<L>>>,
    Path((gateway, school_id)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let gateway: Gateway = gateway
        .parse()
        .map_err(|_| AppError::BadRequest(format!("Unknown gateway: {gateway}")))?;
    let school_id: SchoolId = school_id
        .parse()
        .map_err(|_| AppError::BadRequest("Invalid school ID".into()))?;

    let signature = headers
        .get(signature_header_name(gateway))
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            AppError::Unauthorized(format!(
                "Missing {} header",
                signature_header_name(gateway)
            ))
        })?;

    let outcome = state
        .service
        .ingest_webhook(gateway, school_id, &body, signature, state.orphan_policy)
        .await?;

    let (status, result) = match outcome {
        IngestOutcome::Applied => (StatusCode::OK, "applied"),
        IngestOutcome::NoOp => (StatusCode::OK, "no_op"),
        IngestOutcome::Queued => (StatusCode::ACCEPTED, "queued"),
    };
    Ok((status, Json(serde_json::json!({ "result": result }))))
}

#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    pub school_id: Option<SchoolId>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub format: Option<String>,
}

/// Financial report (admin). Inline JSON or CSV; spreadsheet/PDF exports
/// live in external formatters and answer 400 here.
#[tracing::instrument(skip(state))]
pub async fn financial_report<L: PaymentLedger>(
    State(state): State<Arc<AppState<L>>>,
    Query(query): Query<ReportQuery>,
) -> Result<Response, ApiError> {
    let to = query.to.unwrap_or_else(Utc::now);
    let from = query.from.unwrap_or_else(|| to - Duration::days(30));
    let format: ReportFormat = query.format.as_deref().unwrap_or("json").parse()?;

    let summary = state
        .service
        .financial_report(query.school_id, from, to)
        .await?;

    match format {
        ReportFormat::Json => Ok(Json(summary).into_response()),
        ReportFormat::Csv => Ok((
            [(header::CONTENT_TYPE, "text/csv; charset=utf-8")],
            report::render_csv(&summary),
        )
            .into_response()),
    }
}

/// One-shot reconciliation sweep (admin).
#[tracing::instrument(skip(state))]
pub async fn reconcile_now<L: PaymentLedger>(
    State(state): State<Arc<AppState<L>>>,
) -> Result<impl IntoResponse, ApiError> {
    let report = reconcile::sweep_once(&state.service, state.reconcile).await?;
    Ok(Json(report))
}
