//! # Enrollpay Hex
//!
//! Application service layer and HTTP adapter for the enrollment payment
//! service.
//!
//! ## Architecture
//!
//! - `service` - Intent creation, status-event application, record reads
//! - `ingest` - Webhook ingestion with orphan retry
//! - `reconcile` - Scheduled reconciliation sweep
//! - `report` - Financial report aggregation
//! - `inbound/` - HTTP adapter (Axum server)
//!
//! The service is generic over `L: PaymentLedger`, allowing different ledger
//! implementations to be injected; the provider, tenant, enrollment and
//! notification collaborators are injected as trait objects.

pub mod inbound;
pub mod ingest;
pub mod openapi;
pub mod reconcile;
pub mod report;
pub mod service;

#[cfg(test)]
mod service_tests;

pub use ingest::{IngestOutcome, OrphanPolicy};
pub use reconcile::{ReconcileSettings, ReconciliationWorker};
pub use report::ReportFormat;
pub use service::PaymentService;
