//! # Enrollpay Types
//!
//! Domain types and port traits for the enrollment payment service.
//! This crate has ZERO external IO dependencies - only data structures,
//! business rules, and trait definitions.
//!
//! ## Architecture
//!
//! This crate represents the **innermost core** of the hexagonal architecture:
//! - `domain/` - Pure domain types (Money, PaymentRecord, the status machine)
//! - `ports/` - Trait definitions that adapters must implement
//! - `dto/` - Data Transfer Objects for API boundaries
//! - `error/` - Domain and application error types

pub mod domain;
pub mod dto;
pub mod error;
pub mod ports;

// Re-export commonly used types
pub use domain::{
    Currency, CustomerInfo, EnrollmentId, EventSource, Gateway, Money, PaymentId, PaymentMethod,
    PaymentRecord, PaymentStatus, SchoolId, StatusEvent, StudentId,
};
pub use dto::*;
pub use error::{AppError, DomainError, GatewayError, LedgerError};
pub use ports::{
    AdapterFactory, AlertKind, ChargeReceipt, ChargeRequest, EnrollmentDirectory, EnrollmentRef,
    Expected, GatewayAdapter, GatewayCredentials, NewPaymentRecord, Notifier, PaymentLedger,
    ProviderTruth, TenantConfigStore, TransitionOutcome,
};
