//! Core error types for famledger.
//!
//! This module defines database-agnostic error types. Storage-specific errors
//! (from Diesel, SQLite, etc.) are converted to these types by the storage layer,
//! and HTTP failures are converted by the bank data client.

use chrono::ParseError as ChronoParseError;
use thiserror::Error;

/// Type alias for Result using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Root error type for the sync core.
///
/// The variants follow the sync error taxonomy: `Auth` is fatal to a whole
/// sync run, every other variant is recorded against the account or the
/// transaction it happened on and the run carries on.
#[derive(Error, Debug)]
pub enum Error {
    /// Credential exchange or refresh failed outright, or the provider kept
    /// rejecting a freshly acquired token.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Non-auth HTTP failure returned by the bank data provider.
    #[error("Remote error {status_code}: {body}")]
    Remote { status_code: u16, body: String },

    /// Transport failure (connect error, timeout) talking to the provider.
    #[error("Network error: {0}")]
    Network(String),

    /// A single external transaction could not be mapped into the ledger.
    #[error("Mapping failed: {0}")]
    Mapping(String),

    /// The ledger or another repository rejected an operation.
    #[error("Database operation failed: {0}")]
    Database(#[from] DatabaseError),

    #[error("Input validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// A job, requisition or other addressed resource does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid configuration value: {0}")]
    Config(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl Error {
    /// Builds a remote error, truncating very large bodies.
    pub fn remote(status_code: u16, body: impl Into<String>) -> Self {
        let body: String = body.into();
        Error::Remote {
            status_code,
            body: body.chars().take(500).collect(),
        }
    }

    /// Whether this error must abort the whole sync run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Auth(_))
    }

    /// Short machine-readable classification, stored with run errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Auth(_) => "auth",
            Error::Remote { .. } => "remote",
            Error::Network(_) => "network",
            Error::Mapping(_) => "mapping",
            Error::Database(_) => "storage",
            Error::Validation(_) => "validation",
            Error::Scheduler(_) => "scheduler",
            Error::NotFound(_) => "not_found",
            Error::Config(_) => "config",
            Error::Unexpected(_) => "unexpected",
        }
    }

    /// True when the storage layer reported a unique constraint violation.
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Error::Database(DatabaseError::UniqueViolation(_)))
    }
}

/// Database-agnostic error type for storage operations.
///
/// This enum uses `String` for all error details, allowing the storage layer
/// to convert storage-specific errors (Diesel, SQLite, etc.) into this format.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to establish a database connection.
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to create or configure the connection pool.
    #[error("Failed to create database pool: {0}")]
    PoolCreationFailed(String),

    /// A database query failed to execute.
    #[error("Database query failed: {0}")]
    QueryFailed(String),

    /// The requested record was not found.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// A unique constraint was violated (e.g., duplicate external id).
    #[error("Unique constraint violation: {0}")]
    UniqueViolation(String),

    /// A foreign key constraint was violated.
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// Database migration failed.
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Internal/unexpected database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

/// Validation errors for user input and data parsing.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Required field '{0}' is missing")]
    MissingField(String),

    #[error("Failed to parse decimal number: {0}")]
    DecimalParse(#[from] rust_decimal::Error),

    #[error("Failed to parse date/time: {0}")]
    DateTimeParse(#[from] ChronoParseError),

    #[error("Invalid recurrence rule '{rule}': {reason}")]
    Recurrence { rule: String, reason: String },
}

// === From implementations for common error types ===

impl From<rust_decimal::Error> for Error {
    fn from(err: rust_decimal::Error) -> Self {
        Error::Validation(ValidationError::DecimalParse(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Validation(ValidationError::InvalidInput(err.to_string()))
    }
}

impl From<ChronoParseError> for Error {
    fn from(err: ChronoParseError) -> Self {
        Error::Validation(ValidationError::DateTimeParse(err))
    }
}

impl From<Error> for String {
    fn from(err: Error) -> Self {
        err.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_auth_is_fatal() {
        assert!(Error::Auth("revoked".to_string()).is_fatal());
        assert!(!Error::remote(429, "slow down").is_fatal());
        assert!(!Error::Mapping("bad payload".to_string()).is_fatal());
        assert!(!Error::Network("timeout".to_string()).is_fatal());
    }

    #[test]
    fn test_remote_body_is_truncated() {
        let err = Error::remote(500, "x".repeat(2_000));
        match err {
            Error::Remote { status_code, body } => {
                assert_eq!(status_code, 500);
                assert_eq!(body.len(), 500);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(Error::Auth(String::new()).kind(), "auth");
        assert_eq!(
            Error::Database(DatabaseError::QueryFailed(String::new())).kind(),
            "storage"
        );
        assert!(
            Error::Database(DatabaseError::UniqueViolation("external_id".into()))
                .is_unique_violation()
        );
    }
}
