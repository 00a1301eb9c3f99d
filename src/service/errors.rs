//! # Storage Service Errors

use thiserror::Error;

/// Result type for storage service operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage service errors
///
/// Payloads are strings so an error can be cloned into fan-out reports
/// and logged after the originating backend call has returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    // Object errors
    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    // Integrity errors
    #[error("Checksum mismatch for key: {0}")]
    IntegrityError(String),

    #[error("Content mismatch: {0}")]
    ContentMismatch(String),

    // Signed URL errors
    #[error("URL expired")]
    UrlExpired,

    #[error("Invalid signature")]
    InvalidSignature,

    // I/O errors
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Service {0} did not finish before the deadline")]
    DeadlineExceeded(String),

    // Configuration errors
    #[error("Unknown service '{name}' referenced by '{referenced_by}'")]
    UnknownService { name: String, referenced_by: String },

    #[error("Service reference cycle: {}", .0.join(" -> "))]
    ServiceCycle(Vec<String>),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Internal
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StorageError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            StorageError::ObjectNotFound(_) => 404,
            StorageError::InvalidKey(_) => 400,
            StorageError::IntegrityError(_) => 422,
            StorageError::ContentMismatch(_) => 422,
            StorageError::UrlExpired => 403,
            StorageError::InvalidSignature => 403,
            StorageError::IoError(_) => 500,
            StorageError::DeadlineExceeded(_) => 504,
            StorageError::UnknownService { .. } => 404,
            StorageError::ServiceCycle(_) => 500,
            StorageError::InvalidConfig(_) => 500,
            StorageError::Internal(_) => 500,
        }
    }

    /// Whether this error can only come out of registry construction
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            StorageError::UnknownService { .. }
                | StorageError::ServiceCycle(_)
                | StorageError::InvalidConfig(_)
        )
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::IoError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(StorageError::ObjectNotFound("k".into()).status_code(), 404);
        assert_eq!(StorageError::IntegrityError("k".into()).status_code(), 422);
        assert_eq!(StorageError::InvalidSignature.status_code(), 403);
        assert_eq!(StorageError::DeadlineExceeded("b".into()).status_code(), 504);
    }

    #[test]
    fn test_configuration_errors() {
        assert!(StorageError::ServiceCycle(vec!["a".into(), "a".into()]).is_configuration_error());
        assert!(StorageError::InvalidConfig("x".into()).is_configuration_error());
        assert!(!StorageError::IoError("disk gone".into()).is_configuration_error());
    }

    #[test]
    fn test_cycle_display() {
        let err = StorageError::ServiceCycle(vec!["a".into(), "b".into(), "a".into()]);
        assert_eq!(err.to_string(), "Service reference cycle: a -> b -> a");
    }
}
