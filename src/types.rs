//! Shared result and error types for Firmament
//!
//! One crate-level error enum covering the whole failure taxonomy. Expected
//! deployment-validation failures are NOT errors - the validation pipeline
//! reports those as values (see `deployment::validations::ValidationResult`).

use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, FirmamentError>;

/// Error types for Firmament operations
#[derive(Debug, Error)]
pub enum FirmamentError {
    /// Malformed JSON or schema violation in an entity document
    #[error("Structural validation failed: {0}")]
    StructuralValidation(String),

    /// Declared content hash does not match the recomputed hash
    #[error("Hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    /// Bad, expired or wrongly-signed auth chain
    #[error("Auth chain error: {0}")]
    AuthChain(String),

    /// ACL check failed for the requested operation
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Size or parcel quota exceeded
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Unknown world, entity or permission record
    #[error("Not found: {0}")]
    NotFound(String),

    /// Duplicate grant target or missing grant to revoke
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Database connectivity or query failure
    #[error("Database error: {0}")]
    Database(String),

    /// Content store I/O failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Outbound notification delivery failure (contained, never surfaced
    /// as the triggering mutation's error)
    #[error("Notification delivery failed: {0}")]
    Notification(String),

    /// Anything unexpected
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FirmamentError {
    /// Whether this error maps to a client fault (4xx-class) rather than a
    /// server-side failure.
    pub fn is_client_fault(&self) -> bool {
        matches!(
            self,
            FirmamentError::StructuralValidation(_)
                | FirmamentError::HashMismatch { .. }
                | FirmamentError::AuthChain(_)
                | FirmamentError::PermissionDenied(_)
                | FirmamentError::QuotaExceeded(_)
                | FirmamentError::NotFound(_)
                | FirmamentError::Conflict(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_fault_classification() {
        assert!(FirmamentError::NotFound("world foo".into()).is_client_fault());
        assert!(FirmamentError::HashMismatch {
            expected: "a".into(),
            actual: "b".into()
        }
        .is_client_fault());
        assert!(!FirmamentError::Database("connection reset".into()).is_client_fault());
        assert!(!FirmamentError::Storage("disk full".into()).is_client_fault());
    }

    #[test]
    fn test_error_display() {
        let err = FirmamentError::HashMismatch {
            expected: "bafkreiabc".into(),
            actual: "bafkreixyz".into(),
        };
        assert_eq!(
            err.to_string(),
            "Hash mismatch: expected bafkreiabc, got bafkreixyz"
        );
    }
}
