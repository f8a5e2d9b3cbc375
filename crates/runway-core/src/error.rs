//! Unified application error types for Runway.
//!
//! All crates map their internal errors into [`AppError`] for consistent
//! propagation through the ? operator. The command pipeline and the job
//! executor branch on [`ErrorKind`] to decide whether a failure is retried
//! in-process, fed into a job's retry counter, or propagated unchanged.

use std::fmt;
use thiserror::Error;

/// Top-level error kind categorization used across the entire runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    /// The requested entity was not found.
    NotFound,
    /// The caller lacks one or more required permissions.
    Authorization,
    /// Input validation failed.
    Validation,
    /// A business rule rejected the operation.
    Conflict,
    /// Another transaction changed an entity this one read (stale revision).
    ConcurrentModification,
    /// An internal error occurred.
    Internal,
    /// A datastore error occurred.
    Database,
    /// A configuration error occurred (unknown handler, unknown batch type, ...).
    Configuration,
    /// A serialization/deserialization error occurred.
    Serialization,
    /// An unrecoverable error that must stop the job executor.
    Fatal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "NOT_FOUND"),
            Self::Authorization => write!(f, "AUTHORIZATION"),
            Self::Validation => write!(f, "VALIDATION"),
            Self::Conflict => write!(f, "CONFLICT"),
            Self::ConcurrentModification => write!(f, "CONCURRENT_MODIFICATION"),
            Self::Internal => write!(f, "INTERNAL"),
            Self::Database => write!(f, "DATABASE"),
            Self::Configuration => write!(f, "CONFIGURATION"),
            Self::Serialization => write!(f, "SERIALIZATION"),
            Self::Fatal => write!(f, "FATAL"),
        }
    }
}

/// One unmet atomic permission check, reported on authorization denial.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct MissingAuthorization {
    /// Permission name, e.g. `UPDATE`.
    pub permission: String,
    /// Resource type name, e.g. `JOB`.
    pub resource: String,
    /// Resource instance id, or `*`.
    pub resource_id: String,
}

impl fmt::Display for MissingAuthorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' permission on resource '{}' of type '{}'",
            self.permission, self.resource_id, self.resource
        )
    }
}

/// The unified application error used throughout Runway.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct AppError {
    /// The category of error.
    pub kind: ErrorKind,
    /// A human-readable error message.
    pub message: String,
    /// Unmet permission checks; only populated for [`ErrorKind::Authorization`].
    pub missing_authorizations: Vec<MissingAuthorization>,
    /// Optional underlying cause.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new application error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            missing_authorizations: Vec::new(),
            source: None,
        }
    }

    /// Create a new application error with an underlying cause.
    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            missing_authorizations: Vec::new(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Create an authorization error carrying every unmet check.
    pub fn authorization_denied(user_id: &str, missing: Vec<MissingAuthorization>) -> Self {
        let detail = missing
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" or ");
        Self {
            kind: ErrorKind::Authorization,
            message: format!("User '{user_id}' does not have {detail}"),
            missing_authorizations: missing,
            source: None,
        }
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Create a conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    /// Create a concurrent-modification error.
    pub fn concurrent_modification(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConcurrentModification, message)
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    /// Create a fatal error.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Fatal, message)
    }

    /// Whether this error signals an optimistic-locking conflict.
    pub fn is_concurrent_modification(&self) -> bool {
        self.kind == ErrorKind::ConcurrentModification
    }

    /// Whether this error must stop the job executor.
    pub fn is_fatal(&self) -> bool {
        self.kind == ErrorKind::Fatal
    }

    /// Render the error followed by its cause chain, one cause per line.
    pub fn chain_report(&self) -> String {
        let mut report = self.to_string();
        let mut cause = std::error::Error::source(self);
        while let Some(err) = cause {
            report.push_str("\nCaused by: ");
            report.push_str(&err.to_string());
            cause = err.source();
        }
        report
    }
}

impl Clone for AppError {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            message: self.message.clone(),
            missing_authorizations: self.missing_authorizations.clone(),
            source: None,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(
            ErrorKind::Serialization,
            format!("JSON serialization error: {err}"),
            err,
        )
    }
}

#[cfg(feature = "sqlx")]
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        // Serialization failures and deadlocks mean another transaction won.
        let conflict = match &err {
            sqlx::Error::Database(db) => {
                matches!(db.code().as_deref(), Some("40001") | Some("40P01"))
            }
            _ => false,
        };
        let kind = if conflict {
            ErrorKind::ConcurrentModification
        } else {
            ErrorKind::Database
        };
        Self::with_source(kind, format!("Database error: {err}"), err)
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::with_source(
            ErrorKind::Configuration,
            format!("Configuration error: {err}"),
            err,
        )
    }
}
