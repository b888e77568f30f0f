//! Error types for the enrollment payment service.

use crate::domain::{PaymentId, PaymentStatus};

/// Domain-level errors (business rule violations).
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("Amount cannot be negative")]
    NegativeAmount,

    #[error("Illegal status transition: {from} -> {to}")]
    IllegalTransition {
        from: PaymentStatus,
        to: PaymentStatus,
    },

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Ledger-level errors (data access failures).
///
/// Benign races are NOT errors: a compare-and-set miss comes back as
/// `TransitionOutcome::NoOp`, never through this enum.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Payment record not found: {0}")]
    NotFound(PaymentId),
}

/// Errors crossing the provider boundary.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Security rejection. Logged and alerted, never retried as if valid.
    #[error("Webhook signature verification failed: {0}")]
    Signature(String),

    /// Transient provider failure, eligible for reconciliation-driven retry.
    #[error("Provider unreachable: {0}")]
    Unavailable(String),

    /// The provider answered but refused the operation.
    #[error("Provider {provider} rejected the request: {message}")]
    Rejected { provider: String, message: String },

    /// Provider vocabulary miss. The record moves to `unknown` and an
    /// operator alert fires; never auto-resolved to a terminal state.
    #[error("Unmapped provider status: {raw}")]
    UnknownStatus { raw: String },

    /// The payload could not be parsed into a `StatusEvent`.
    #[error("Malformed provider payload: {0}")]
    Malformed(String),

    #[error("Gateway configuration error: {0}")]
    Config(String),
}

/// Application-level errors (for HTTP responses).
///
/// Maps cleanly to HTTP status codes.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Duplicate intent: {0}")]
    DuplicateIntent(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Domain(DomainError::Validation(msg)) => AppError::BadRequest(msg),
            LedgerError::Domain(e) => AppError::BadRequest(e.to_string()),
            LedgerError::NotFound(id) => AppError::NotFound(format!("Payment {id}")),
            LedgerError::Conflict(msg) => AppError::DuplicateIntent(msg),
            LedgerError::Database(e) => AppError::Internal(e),
        }
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Signature(msg) => AppError::Unauthorized(msg),
            GatewayError::Unavailable(msg) => AppError::ProviderUnavailable(msg),
            GatewayError::Rejected { provider, message } => {
                AppError::BadRequest(format!("{provider}: {message}"))
            }
            GatewayError::UnknownStatus { raw } => {
                AppError::Internal(format!("Unmapped provider status: {raw}"))
            }
            GatewayError::Malformed(msg) => AppError::BadRequest(msg),
            GatewayError::Config(msg) => AppError::Internal(msg),
        }
    }
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}
