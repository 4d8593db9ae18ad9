//! Error types for service lifecycles.

use std::any::Any;
use std::sync::Arc;

use meridian_core::panic_message;
use thiserror::Error;

/// Result type for service run bodies.
pub type ServiceResult = Result<(), ServiceError>;

/// An error captured from a service run body.
///
/// Errors are reference counted so the same value can be read repeatedly
/// through [`Service::start_error`](crate::Service::start_error) and
/// re-surfaced by a group as its own error.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    /// The run body returned an error.
    #[error("{0:#}")]
    Failed(Arc<anyhow::Error>),

    /// The run body panicked.
    #[error("service panicked: {0}")]
    Panicked(Arc<str>),
}

impl ServiceError {
    /// Create an error from a panic payload.
    pub fn panicked(payload: Box<dyn Any + Send>) -> Self {
        Self::Panicked(Arc::from(panic_message(payload.as_ref())))
    }

    /// Returns true if both values are the same captured error.
    #[must_use]
    pub fn same(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Failed(a), Self::Failed(b)) => Arc::ptr_eq(a, b),
            (Self::Panicked(a), Self::Panicked(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Check if the error came from a panic.
    pub fn is_panic(&self) -> bool {
        matches!(self, Self::Panicked(_))
    }
}

impl From<anyhow::Error> for ServiceError {
    fn from(err: anyhow::Error) -> Self {
        Self::Failed(Arc::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_context_chain() {
        let err: ServiceError = anyhow::anyhow!("address in use")
            .context("bind failed")
            .into();
        assert_eq!(err.to_string(), "bind failed: address in use");
    }

    #[test]
    fn test_same_compares_identity() {
        let err: ServiceError = anyhow::anyhow!("boom").into();
        let clone = err.clone();
        let other: ServiceError = anyhow::anyhow!("boom").into();

        assert!(err.same(&clone));
        assert!(!err.same(&other));
    }

    #[test]
    fn test_panicked_payloads() {
        let err = ServiceError::panicked(Box::new("static message"));
        assert_eq!(err.to_string(), "service panicked: static message");
        assert!(err.is_panic());

        let err = ServiceError::panicked(Box::new(String::from("owned")));
        assert_eq!(err.to_string(), "service panicked: owned");

        let err = ServiceError::panicked(Box::new(42_u8));
        assert!(err.to_string().contains("unknown"));
    }
}
