//! Admin authentication middleware.
//!
//! Report, reconcile and full-record access are operator surfaces gated by
//! a single configured admin key in the `X-Admin-Key` header, compared in
//! constant time.

use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;

use enrollpay_types::PaymentLedger;

use super::handlers::AppState;

pub const ADMIN_KEY_HEADER: &str = "X-Admin-Key";

/// True when the request carries the configured admin key.
pub fn is_admin(headers: &HeaderMap, admin_key: &str) -> bool {
    headers
        .get(ADMIN_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|provided| bool::from(provided.trim().as_bytes().ct_eq(admin_key.as_bytes())))
        .unwrap_or(false)
}

/// Middleware gating the admin-only routes.
pub async fn admin_middleware<L: PaymentLedger>(
    State(state): State<Arc<AppState<L>>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if is_admin(request.headers(), &state.admin_key) {
        return next.run(request).await;
    }

    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "error": "Missing or invalid admin key",
            "code": 401
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(key: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ADMIN_KEY_HEADER, HeaderValue::from_str(key).unwrap());
        headers
    }

    #[test]
    fn test_is_admin_matches() {
        assert!(is_admin(&headers_with("adm_123"), "adm_123"));
        assert!(is_admin(&headers_with(" adm_123 "), "adm_123"));
    }

    #[test]
    fn test_is_admin_rejects() {
        assert!(!is_admin(&headers_with("adm_999"), "adm_123"));
        assert!(!is_admin(&HeaderMap::new(), "adm_123"));
    }
}
