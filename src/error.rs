//! Error types for manga-mirror
//!
//! This module provides error handling for the library, including:
//! - Domain-specific error types (registry, scan, pipeline, external services)
//! - HTTP status code mapping for API integration
//!
//! Task-level pipeline failures deliberately collapse into one string message
//! on the task row; the enum below exists for propagation inside the process,
//! not for persisted taxonomy.

use thiserror::Error;

/// Result type alias for manga-mirror operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for manga-mirror
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "ADMIN_API_KEY")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Request rejected before any store write
    #[error("validation error: {0}")]
    Validation(String),

    /// Entity not found by id
    #[error("not found: {0}")]
    NotFound(String),

    /// Series create collided on the external catalog id
    #[error("already registered: {0}")]
    AlreadyRegistered(String),

    /// Source scraper call failed
    #[error("scraper error: {0}")]
    Scraper(String),

    /// Stager call failed (download/package/stage step)
    #[error("stager error: {0}")]
    Stager(String),

    /// Uploader call failed (durable storage step)
    #[error("uploader error: {0}")]
    Uploader(String),

    /// Catalog backend call failed
    #[error("catalog error: {0}")]
    Catalog(String),

    /// An external call exceeded its deadline
    #[error("timeout calling {service}")]
    Timeout {
        /// Which external service timed out
        service: String,
    },

    /// Network error from the HTTP client
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Shutdown in progress - not accepting new work
    #[error("shutdown in progress: not accepting new work")]
    ShuttingDown,

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Record not found
    #[error("record not found: {0}")]
    NotFound(String),

    /// Constraint violation (e.g., duplicate key)
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - client error (invalid input)
            Error::Config { .. } => 400,
            Error::Validation(_) => 400,

            // 404 Not Found
            Error::NotFound(_) => 404,
            Error::Database(DatabaseError::NotFound(_)) => 404,

            // 409 Conflict
            Error::AlreadyRegistered(_) => 409,
            Error::Database(DatabaseError::ConstraintViolation(_)) => 409,

            // 500 Internal Server Error - server-side issues
            Error::Database(_) => 500,
            Error::Sqlx(_) => 500,
            Error::Io(_) => 500,
            Error::Serialization(_) => 500,
            Error::ApiServerError(_) => 500,
            Error::Other(_) => 500,

            // 502 Bad Gateway - external collaborator failures
            Error::Scraper(_) => 502,
            Error::Stager(_) => 502,
            Error::Uploader(_) => 502,
            Error::Catalog(_) => 502,
            Error::Network(_) => 502,

            // 504 Gateway Timeout
            Error::Timeout { .. } => 504,

            // 503 Service Unavailable
            Error::ShuttingDown => 503,
        }
    }
}

impl Error {
    /// Shorthand for a timeout on a named external service
    pub fn timeout(service: impl Into<String>) -> Self {
        Error::Timeout {
            service: service.into(),
        }
    }
}
