//! Error types for SaveAudit.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=db, 3=not_found, 4=validation, 5=audit, etc.)
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers
//!
//! A failed business commit is returned exactly as the store produced it
//! (usually [`Error::Database`] or [`Error::Concurrency`]). [`Error::Resolution`]
//! and [`Error::AuditPersist`] only ever travel inside a
//! [`SaveReport`](crate::audit::SaveReport); they never fail a save.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for SaveAudit operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Database (exit 2)
    NotInitialized,
    AlreadyInitialized,
    DatabaseError,
    ConcurrencyConflict,

    // Not Found (exit 3)
    VehicleNotFound,

    // Validation (exit 4)
    InvalidArgument,
    UnknownField,

    // Audit (exit 5)
    DetectionFailed,
    ResolutionFailed,
    AuditPersistFailed,

    // Config (exit 7)
    ConfigError,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Internal (exit 1)
    Cancelled,
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::AlreadyInitialized => "ALREADY_INITIALIZED",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::ConcurrencyConflict => "CONCURRENCY_CONFLICT",
            Self::VehicleNotFound => "VEHICLE_NOT_FOUND",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::UnknownField => "UNKNOWN_FIELD",
            Self::DetectionFailed => "DETECTION_FAILED",
            Self::ResolutionFailed => "RESOLUTION_FAILED",
            Self::AuditPersistFailed => "AUDIT_PERSIST_FAILED",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::Cancelled => "CANCELLED",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Cancelled | Self::InternalError => 1,
            Self::NotInitialized
            | Self::AlreadyInitialized
            | Self::DatabaseError
            | Self::ConcurrencyConflict => 2,
            Self::VehicleNotFound => 3,
            Self::InvalidArgument | Self::UnknownField => 4,
            Self::DetectionFailed | Self::ResolutionFailed | Self::AuditPersistFailed => 5,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError => 8,
        }
    }

    /// Whether every error with this code may succeed on retry.
    ///
    /// Only stale-key conflicts; callers should reload the entity first.
    /// Database errors depend on the underlying failure, see
    /// [`Error::is_retryable`].
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict)
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in SaveAudit operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Not initialized: run `sa init` first")]
    NotInitialized,

    #[error("Already initialized at {path}")]
    AlreadyInitialized { path: PathBuf },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Concurrency conflict: {entity} with key '{key}' was not found in storage")]
    Concurrency { entity: String, key: String },

    #[error("Vehicle not found: {id}")]
    VehicleNotFound { id: i64 },

    #[error("Unknown field '{field}' on {entity}")]
    UnknownField { entity: String, field: String },

    #[error("Change detection failed: {0}")]
    Detection(String),

    #[error("Could not resolve {entity}.{field} after commit: {reason}")]
    Resolution {
        entity: String,
        field: String,
        reason: String,
    },

    #[error("Audit persistence failed: {0}")]
    AuditPersist(#[source] Box<Error>),

    #[error("Save cancelled before commit")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotInitialized => ErrorCode::NotInitialized,
            Self::AlreadyInitialized { .. } => ErrorCode::AlreadyInitialized,
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::Concurrency { .. } => ErrorCode::ConcurrencyConflict,
            Self::VehicleNotFound { .. } => ErrorCode::VehicleNotFound,
            Self::UnknownField { .. } => ErrorCode::UnknownField,
            Self::Detection(_) => ErrorCode::DetectionFailed,
            Self::Resolution { .. } => ErrorCode::ResolutionFailed,
            Self::AuditPersist(_) => ErrorCode::AuditPersistFailed,
            Self::Cancelled => ErrorCode::Cancelled,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Whether retrying the same call may succeed.
    ///
    /// True for lock contention (`SQLITE_BUSY`, `SQLITE_LOCKED`) and stale-key
    /// conflicts. Constraint violations and other database failures repeat.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Database(e) => matches!(
                e.sqlite_error_code(),
                Some(rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked)
            ),
            other => other.error_code().is_retryable(),
        }
    }

    /// Context-aware recovery hint.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::NotInitialized => Some("Run `sa init` to create the database".to_string()),

            Self::AlreadyInitialized { path } => Some(format!(
                "Database already exists at {}. Use `--force` to recreate it.",
                path.display()
            )),

            Self::VehicleNotFound { id } => Some(format!(
                "No vehicle with ID {id}. Use `sa vehicle list` to see stored vehicles."
            )),

            Self::Concurrency { .. } => Some(
                "The row changed or disappeared since it was loaded. Reload it and retry."
                    .to_string(),
            ),

            Self::Database(e) if e.to_string().contains("CHECK constraint failed") => {
                Some("Text fields are limited to 100 characters.".to_string())
            }

            Self::Database(_)
            | Self::UnknownField { .. }
            | Self::Detection(_)
            | Self::Resolution { .. }
            | Self::AuditPersist(_)
            | Self::Cancelled
            | Self::Io(_)
            | Self::Json(_)
            | Self::InvalidArgument(_)
            | Self::Config(_)
            | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": self.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}
