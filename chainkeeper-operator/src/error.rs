//! Error types for the chainkeeper Kubernetes operator.

use crate::admission::FieldErrorList;
use crate::quantity::QuantityError;
use thiserror::Error;

/// Errors that can occur during operator operations.
#[derive(Debug, Error)]
pub enum OperatorError {
    /// Kubernetes API error that is not classified below.
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// Resource not found.
    #[error("Resource not found: {kind}/{name} in namespace {namespace}")]
    NotFound {
        /// Resource kind.
        kind: String,
        /// Resource name.
        name: String,
        /// Resource namespace.
        namespace: String,
    },

    /// The write was rejected because the stored object changed underneath us,
    /// or because the object already exists on create.
    #[error("Conflict writing {kind}/{name}")]
    Conflict {
        /// Resource kind.
        kind: String,
        /// Resource name.
        name: String,
    },

    /// A store round-trip did not finish in time.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Invalid configuration, such as an unparsable resource quantity.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The resource failed admission validation.
    #[error("Validation failed: {0}")]
    ValidationError(FieldErrorList),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Result type for operator operations.
pub type OperatorResult<T> = Result<T, OperatorError>;

impl OperatorError {
    /// Classify a raw API error for a named object into not-found/conflict
    /// where the status code allows it.
    pub fn from_api(err: kube::Error, kind: &str, name: &str, namespace: &str) -> Self {
        match &err {
            kube::Error::Api(resp) if resp.code == 404 => OperatorError::NotFound {
                kind: kind.to_string(),
                name: name.to_string(),
                namespace: namespace.to_string(),
            },
            kube::Error::Api(resp) if resp.code == 409 => OperatorError::Conflict {
                kind: kind.to_string(),
                name: name.to_string(),
            },
            _ => OperatorError::KubeError(err),
        }
    }

    /// Errors that only go away once the user edits the resource.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OperatorError::ValidationError(_) | OperatorError::InvalidConfig(_)
        )
    }

    /// Write failures that are resolved by re-reading the object and trying again.
    pub fn is_stale_write(&self) -> bool {
        matches!(
            self,
            OperatorError::Conflict { .. } | OperatorError::NotFound { .. }
        )
    }
}

impl From<serde_json::Error> for OperatorError {
    fn from(err: serde_json::Error) -> Self {
        OperatorError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for OperatorError {
    fn from(err: serde_yaml::Error) -> Self {
        OperatorError::SerializationError(err.to_string())
    }
}

impl From<QuantityError> for OperatorError {
    fn from(err: QuantityError) -> Self {
        OperatorError::InvalidConfig(err.to_string())
    }
}
