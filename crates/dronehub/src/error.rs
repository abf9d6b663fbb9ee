//! Error types for dronehub.
//!
//! Domain failures (`NotFound`, `Conflict`, `InvalidArgument`, `NoData`) carry
//! the offending identifier or field so callers get a readable message, and
//! every variant maps onto a machine-distinguishable [`ErrorKind`].

use std::fmt;
use std::path::PathBuf;

use rusqlite::ErrorCode;
use thiserror::Error;

/// The main error type for dronehub operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Domain Errors ===
    /// A referenced entity does not exist.
    #[error("{entity} with id {id} not found")]
    NotFound {
        /// Kind of entity that was looked up.
        entity: &'static str,
        /// The identifier that did not resolve.
        id: i64,
    },

    /// A unique field already holds the given value.
    #[error("{entity} with {field} '{value}' already exists")]
    Conflict {
        /// Kind of entity the conflict concerns.
        entity: &'static str,
        /// Name of the unique field.
        field: &'static str,
        /// The duplicated value.
        value: String,
    },

    /// A field is outside its documented range or otherwise malformed.
    #[error("invalid {field}: {message}")]
    InvalidArgument {
        /// Name of the offending field.
        field: &'static str,
        /// What is wrong with it.
        message: String,
    },

    /// The drone exists but has no telemetry.
    #[error("no telemetry data found for drone {drone_id}")]
    NoData {
        /// The drone that was queried.
        drone_id: i64,
    },

    // === Storage Errors ===
    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for dronehub operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Referenced entity is absent.
    NotFound,
    /// Duplicate value in a unique field.
    Conflict,
    /// Field outside its documented range or type.
    InvalidArgument,
    /// Entity exists, queried sub-resource is empty.
    NoData,
    /// Persistence layer failure.
    Storage,
    /// Configuration could not be loaded or is invalid.
    Config,
    /// File system failure.
    Io,
    /// Anything else.
    Internal,
}

impl ErrorKind {
    /// Stable snake_case identifier used in API error bodies.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::InvalidArgument => "invalid_argument",
            Self::NoData => "no_data",
            Self::Storage => "storage",
            Self::Config => "config",
            Self::Io => "io",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a not-found error for a drone.
    #[must_use]
    pub fn drone_not_found(id: i64) -> Self {
        Self::NotFound { entity: "drone", id }
    }

    /// Create a not-found error for a telemetry reading.
    #[must_use]
    pub fn reading_not_found(id: i64) -> Self {
        Self::NotFound {
            entity: "telemetry reading",
            id,
        }
    }

    /// Create a conflict error for a duplicate drone name.
    #[must_use]
    pub fn duplicate_name(name: impl Into<String>) -> Self {
        Self::Conflict {
            entity: "drone",
            field: "name",
            value: name.into(),
        }
    }

    /// Create an invalid argument error.
    #[must_use]
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field,
            message: message.into(),
        }
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Self::NoData { .. } => ErrorKind::NoData,
            Self::DatabaseOpen { .. } | Self::DatabaseQuery(_) | Self::DatabaseMigration { .. } => {
                ErrorKind::Storage
            }
            Self::ConfigLoad(_) | Self::ConfigValidation { .. } => ErrorKind::Config,
            Self::Io(_) | Self::DirectoryCreate { .. } => ErrorKind::Io,
            Self::Json(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Check if this error means a referenced entity is absent.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this error is a unique-field conflict.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Check if this error is the empty-telemetry condition.
    #[must_use]
    pub fn is_no_data(&self) -> bool {
        matches!(self, Self::NoData { .. })
    }
}

/// Check whether a rusqlite error is a constraint violation with the given
/// extended result code (e.g. `SQLITE_CONSTRAINT_UNIQUE`).
pub(crate) fn is_constraint(err: &rusqlite::Error, extended_code: std::ffi::c_int) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::ConstraintViolation && e.extended_code == extended_code
    )
}
