//! Error types for the document repository.
//!
//! Errors are split by layer: [`ConfigError`] for configuration problems
//! detected before any request is made, [`ClientError`] for everything the
//! document service (or the transport to it) reports, and [`RepositoryError`]
//! for the facade itself, which wraps the other two.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use thiserror::Error;

/// The primary error type for repository operations.
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// Configuration errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Errors reported by the document client, propagated unchanged
    #[error(transparent)]
    Client(#[from] ClientError),

    /// The item could not be converted to or from a document.
    #[error("serialization error: {message}")]
    Serialization { message: String },

    /// The item id cannot be used as a document id.
    #[error("invalid document id '{id}': {reason}")]
    InvalidId { id: String, reason: String },

    /// The id passed to an update does not match the id in the item body.
    #[error("document id mismatch: expected '{expected}', item carries '{actual}'")]
    IdMismatch { expected: String, actual: String },

    /// The process-wide repository context has not been initialized.
    #[error("repository context not initialized")]
    NotInitialized,
}

/// Errors related to repository configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required configuration key is absent.
    #[error("missing configuration value: {key}")]
    Missing { key: String },

    /// A configuration value is present but unusable.
    #[error("invalid configuration value for {key}: {message}")]
    Invalid { key: String, message: String },
}

/// Errors returned by a [`DocumentDbApi`](crate::client::DocumentDbApi) implementation.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The addressed database, collection or document does not exist.
    #[error("resource not found: {resource}")]
    NotFound { resource: String },

    /// The service rejected the request.
    #[error("service returned {status}: {message}")]
    Service {
        status: u16,
        code: Option<String>,
        message: String,
        activity_id: Option<String>,
    },

    /// The request was throttled and retries were exhausted.
    #[error("request throttled after {attempts} attempts (retry after {retry_after_ms}ms)")]
    Throttled { retry_after_ms: u64, attempts: u32 },

    /// The service could not be reached.
    #[error("request to {endpoint} failed: {message}")]
    Transport {
        endpoint: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The service answered with a body the client could not interpret.
    #[error("invalid response: {message}")]
    InvalidResponse { message: String },

    /// Request signing failed.
    #[error("authorization error: {message}")]
    Auth { message: String },
}

impl ClientError {
    /// Returns `true` if the service reported that the resource does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound { .. })
    }

    /// Returns the HTTP status associated with this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::NotFound { .. } => Some(404),
            ClientError::Service { status, .. } => Some(*status),
            ClientError::Throttled { .. } => Some(429),
            _ => None,
        }
    }
}

impl RepositoryError {
    /// Returns `true` if the underlying client reported not-found.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RepositoryError::Client(err) if err.is_not_found())
    }
}

/// Result type alias for repository operations.
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Result type alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        let endpoint = err
            .url()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        ClientError::Transport {
            endpoint,
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}
