//! # Enrollpay Application
//!
//! Binary that wires together all the components:
//! - Load configuration from environment
//! - Initialize the repository adapter
//! - Create the payment service with the provider adapter factory
//! - Spawn the reconciliation worker
//! - Start the HTTP server

mod config;
mod notify;

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use enrollpay_gateways::ProviderFactory;
use enrollpay_hex::{PaymentService, ReconciliationWorker, inbound::HttpServer};
use enrollpay_repo::build_repo;
use enrollpay_types::{EnrollmentDirectory, TenantConfigStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,enrollpay_app=debug,enrollpay_hex=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::from_env()?;

    tracing::info!("Starting enrollpay server on port {}", config.port);
    tracing::info!("Using database: {}", config.database_url);

    // Build repository (handles connection and migration)
    let repo = Arc::new(build_repo(&config.database_url).await?);

    // The repository backs the ledger, tenant credential store and
    // enrollment directory; the gateway factory builds provider adapters
    // per call from those credentials.
    let tenants: Arc<dyn TenantConfigStore> = repo.clone();
    let enrollments: Arc<dyn EnrollmentDirectory> = repo.clone();
    let service = PaymentService::new(
        repo,
        Arc::new(ProviderFactory::new(config.provider_timeout)),
        tenants,
        enrollments,
        Arc::new(notify::LogNotifier),
    );

    // Spawn the reconciliation worker
    let worker = ReconciliationWorker::new(service.clone(), config.reconcile);
    tokio::spawn(worker.run());

    // Create and run the HTTP server
    let server = HttpServer::new(service, config.admin_key, config.orphan, config.reconcile);
    let addr = format!("0.0.0.0:{}", config.port);

    server.run(&addr).await?;

    Ok(())
}
