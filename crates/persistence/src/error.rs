//! Error types for the storage engine.
//!
//! Every error kind here maps to exactly one class of HTTP outcome in the
//! REST layer; see `vireo-rest`'s error mapping.

use thiserror::Error;

/// The primary error type for all storage operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The requested resource or history version does not exist.
    #[error("resource not found: {resource_type}/{id}")]
    NotFound { resource_type: String, id: String },

    /// A resource with the given id already exists (primary-key collision on create).
    #[error("resource already exists: {resource_type}/{id}")]
    Conflict { resource_type: String, id: String },

    /// Malformed request content: bad JSON, missing `resourceType`, id mismatch,
    /// or a resource type without a backing table.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// A reference embedded in the resource resolves to no live target.
    #[error("invalid reference: {reference}")]
    InvalidReference { reference: String },

    /// A search control parameter outside the supported whitelist.
    #[error("unsupported search parameter: {parameter}")]
    UnsupportedParameter { parameter: String },

    /// A value cannot be rendered for, or coerced to, its target column type.
    #[error("format error: {message}")]
    Format { message: String },

    /// Database failures, compensation failures, and everything unexpected.
    #[error("internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl StoreError {
    /// Shorthand for an [`StoreError::Internal`] without a source.
    pub fn internal(message: impl Into<String>) -> Self {
        StoreError::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for an [`StoreError::InvalidInput`].
    pub fn invalid(message: impl Into<String>) -> Self {
        StoreError::InvalidInput {
            message: message.into(),
        }
    }

    /// Shorthand for a [`StoreError::Format`].
    pub fn format(message: impl Into<String>) -> Self {
        StoreError::Format {
            message: message.into(),
        }
    }

    /// Shorthand for a [`StoreError::NotFound`].
    pub fn not_found(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        StoreError::NotFound {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::InvalidInput {
            message: format!("malformed JSON: {}", err),
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Internal {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<r2d2::Error> for StoreError {
    fn from(err: r2d2::Error) -> Self {
        StoreError::Internal {
            message: format!("connection pool exhausted: {}", err),
            source: Some(Box::new(err)),
        }
    }
}

#[cfg(feature = "postgres")]
impl From<tokio_postgres::Error> for StoreError {
    fn from(err: tokio_postgres::Error) -> Self {
        StoreError::Internal {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

#[cfg(feature = "postgres")]
impl From<deadpool_postgres::PoolError> for StoreError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        StoreError::Internal {
            message: format!("connection pool error: {}", err),
            source: Some(Box::new(err)),
        }
    }
}

/// Result type alias for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display() {
        let err = StoreError::not_found("Patient", "123");
        assert_eq!(err.to_string(), "resource not found: Patient/123");
    }

    #[test]
    fn conflict_display() {
        let err = StoreError::Conflict {
            resource_type: "Patient".to_string(),
            id: "123".to_string(),
        };
        assert_eq!(err.to_string(), "resource already exists: Patient/123");
    }

    #[test]
    fn json_error_maps_to_invalid_input() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: StoreError = parse_err.into();
        assert!(matches!(err, StoreError::InvalidInput { .. }));
    }
}
