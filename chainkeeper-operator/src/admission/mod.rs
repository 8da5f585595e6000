//! Admission: defaulting and validation of node resources.
//!
//! Each node kind implements [`Defaulter`] and [`Validator`]. The same impls
//! back the webhook server (see [`review`]) and the inline path the
//! controllers take when webhooks are disabled.

mod field;
pub mod resources;
pub mod review;

pub use field::{FieldError, FieldErrorList, FieldErrorType, FieldPath};
pub use resources::{check_limit, LimitPolicy, QuantityPair, CPU_POLICY, MEMORY_POLICY};
pub use review::{dispatch, AdmissionRequest, AdmissionResponse, AdmissionReview};

/// Fills unset optional fields with family defaults.
///
/// Implementations must be idempotent and only touch empty or zero values.
pub trait Defaulter {
    /// Apply defaults in place.
    fn default_spec(&mut self);
}

/// Structural and cross-field checks.
///
/// Errors accumulate; an empty list means the object is acceptable.
pub trait Validator {
    /// Checks run when the object is created.
    fn validate_create(&self) -> FieldErrorList;

    /// Checks run when `old` is replaced by `self`.
    fn validate_update(&self, old: &Self) -> FieldErrorList;
}
