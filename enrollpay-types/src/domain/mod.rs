//! Domain models for the enrollment payment service.

pub mod event;
pub mod money;
pub mod payment;
pub mod status;

pub use event::{EventSource, StatusEvent};
pub use money::{Currency, Money};
pub use payment::{
    CustomerInfo, EnrollmentId, Gateway, PaymentId, PaymentMethod, PaymentRecord, SchoolId,
    StudentId,
};
pub use status::PaymentStatus;
