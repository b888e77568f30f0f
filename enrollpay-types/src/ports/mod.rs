//! Port traits (interfaces for adapters).
//!
//! These are the contracts that adapters must implement.
//! The application layer depends on these traits, not concrete implementations.

mod enrollment;
mod gateway;
mod ledger;
mod notify;
mod tenant;

pub use enrollment::{EnrollmentDirectory, EnrollmentRef};
pub use gateway::{AdapterFactory, ChargeReceipt, ChargeRequest, GatewayAdapter, ProviderTruth};
pub use ledger::{Expected, NewPaymentRecord, PaymentLedger, TransitionOutcome};
pub use notify::{AlertKind, Notifier};
pub use tenant::{GatewayCredentials, TenantConfigStore};
