//! HTTP Server configuration and startup.

use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use enrollpay_types::PaymentLedger;

use super::auth::admin_middleware;
use super::handlers::{self, AppState};
use crate::PaymentService;
use crate::ingest::OrphanPolicy;
use crate::reconcile::ReconcileSettings;

/// HTTP Server for the enrollment payments API.
pub struct HttpServer<L: PaymentLedger> {
    state: Arc<AppState<L>>,
}

impl<L: PaymentLedger> HttpServer<L> {
    /// Creates a new HTTP server with the given service.
    pub fn new(
        service: PaymentService<L>,
        admin_key: String,
        orphan_policy: OrphanPolicy,
        reconcile: ReconcileSettings,
    ) -> Self {
        Self {
            state: Arc::new(AppState {
                service,
                admin_key,
                orphan_policy,
                reconcile,
            }),
        }
    }

    /// Builds the Axum router with all routes.
    pub fn router(&self) -> Router {
        let admin_routes = Router::new()
            .route("/payments/report", get(handlers::financial_report::<L>))
            .route("/payments/reconcile", post(handlers::reconcile_now::<L>))
            .route_layer(middleware::from_fn_with_state(
                self.state.clone(),
                admin_middleware::<L>,
            ));

        Router::new()
            .route("/health", get(handlers::health))
            .route("/payments/intent", post(handlers::create_intent::<L>))
            .route("/payments/{id}", get(handlers::get_payment::<L>))
            .route(
                "/payments/webhook/{gateway}/{school_id}",
                post(handlers::gateway_webhook::<L>),
            )
            .merge(admin_routes)
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Runs the server on the given address with graceful shutdown.
    pub async fn run(self, addr: &str) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Server listening on {}", listener.local_addr()?);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown...");
}
