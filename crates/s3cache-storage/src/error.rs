//! Storage error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl StorageError {
    /// The backend's own description of the failure, without the kind prefix.
    ///
    /// This is what gets written into 404 bodies.
    pub fn message(&self) -> String {
        match self {
            StorageError::Io(e) => e.to_string(),
            StorageError::NotFound(msg)
            | StorageError::AccessDenied(msg)
            | StorageError::Backend(msg)
            | StorageError::Configuration(msg) => msg.clone(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }

    /// Label used for the backend outcome metric
    pub fn kind(&self) -> &'static str {
        match self {
            StorageError::Io(_) => "io",
            StorageError::NotFound(_) => "not_found",
            StorageError::AccessDenied(_) => "access_denied",
            StorageError::Backend(_) => "backend",
            StorageError::Configuration(_) => "configuration",
        }
    }
}

impl From<object_store::Error> for StorageError {
    fn from(e: object_store::Error) -> Self {
        match e {
            object_store::Error::NotFound { source, .. } => StorageError::NotFound(source.to_string()),
            object_store::Error::PermissionDenied { source, .. }
            | object_store::Error::Unauthenticated { source, .. } => {
                StorageError::AccessDenied(source.to_string())
            }
            object_store::Error::InvalidPath { source } => StorageError::Backend(source.to_string()),
            other => StorageError::Backend(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_strips_kind() {
        let err = StorageError::NotFound("no such key".to_string());
        assert_eq!(err.message(), "no such key");
        assert_eq!(err.to_string(), "Object not found: no such key");
        assert!(err.is_not_found());

        let err = StorageError::AccessDenied("forbidden".to_string());
        assert_eq!(err.message(), "forbidden");
        assert!(!err.is_not_found());
        assert_eq!(err.kind(), "access_denied");
    }
}
