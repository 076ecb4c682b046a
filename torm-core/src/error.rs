//! Error types and result types for torm operations.
//!
//! Every fallible operation in the workspace returns [`TormResult<T>`]. Validation failures are
//! carried as a structured [`ValidationError`] so callers can inspect the failing field and the
//! rule that rejected it.

use serde_json::Error as SerdeJsonError;
use std::fmt;
use thiserror::Error;

/// Represents all possible errors that can occur when talking to a ToonStore server.
#[derive(Error, Debug)]
pub enum TormError {
    /// A document violated its schema. Always raised before any request is sent.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// A request to the remote store failed, either in transport or with a non-success status.
    #[error("Gateway error during {operation}: {cause}")]
    Gateway {
        /// The operation that was being performed (e.g. `create`, `query`).
        operation: String,
        /// The HTTP status returned by the server, if a response was received.
        status: Option<u16>,
        /// A description of the underlying failure.
        cause: String,
    },
    /// An ordered comparison was attempted between values of incompatible kinds.
    #[error("Comparison error: {0}")]
    Comparison(String),
    /// A query operator received a value of the wrong kind.
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),
    /// A migration's `up` or `down` action failed.
    #[error("Migration {id} failed while running {direction}: {source}")]
    MigrationAction {
        /// The id of the migration whose action failed.
        id: String,
        /// Which action was running.
        direction: MigrationDirection,
        /// The error raised by the action.
        #[source]
        source: Box<TormError>,
    },
    /// A migration with the same id was already registered.
    #[error("Migration {0} is already registered")]
    DuplicateMigration(String),
    /// A schema definition could not be parsed or compiled.
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),
    /// Serialization/deserialization error when converting documents or wire bodies.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during transport initialization.
    #[error("Initialization error: {0}")]
    Initialization(String),
}

impl TormError {
    /// Builds a [`TormError::Gateway`] without a response status (transport-level failure).
    pub fn gateway(operation: impl Into<String>, cause: impl fmt::Display) -> Self {
        TormError::Gateway {
            operation: operation.into(),
            status: None,
            cause: cause.to_string(),
        }
    }

    /// Builds a [`TormError::Gateway`] for a response with a non-success status.
    pub fn gateway_status(operation: impl Into<String>, status: u16, cause: impl fmt::Display) -> Self {
        TormError::Gateway {
            operation: operation.into(),
            status: Some(status),
            cause: cause.to_string(),
        }
    }

    /// Returns the validation error if this is a validation failure.
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            TormError::Validation(err) => Some(err),
            _ => None,
        }
    }
}

/// A specialized `Result` type for torm operations.
pub type TormResult<T> = Result<T, TormError>;

impl From<SerdeJsonError> for TormError {
    fn from(err: SerdeJsonError) -> Self {
        TormError::Serialization(err.to_string())
    }
}

/// Direction a migration action runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationDirection {
    /// Applying the migration.
    Up,
    /// Rolling the migration back.
    Down,
}

impl fmt::Display for MigrationDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationDirection::Up => f.write_str("up"),
            MigrationDirection::Down => f.write_str("down"),
        }
    }
}

/// The first schema rule a document failed.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Field '{field}' {kind}")]
pub struct ValidationError {
    /// Name of the failing field.
    pub field: String,
    /// The rule that rejected it.
    pub kind: ValidationErrorKind,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, kind: ValidationErrorKind) -> Self {
        Self { field: field.into(), kind }
    }
}

/// Why a field failed validation.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationErrorKind {
    /// A required field was absent or null.
    MissingField,
    /// The value's kind did not match the declared type.
    TypeMismatch { expected: String },
    /// A string was shorter than `min_length` or longer than `max_length`.
    LengthOutOfRange { min: Option<usize>, max: Option<usize>, actual: usize },
    /// A string failed an `email` or `url` format check.
    InvalidFormat { format: String },
    /// A string did not match the rule's pattern.
    PatternMismatch { pattern: String },
    /// A number fell outside `min`/`max`.
    RangeViolation { min: Option<f64>, max: Option<f64>, actual: f64 },
    /// The custom predicate returned false.
    CustomValidationFailed,
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationErrorKind::MissingField => write!(f, "is required"),
            ValidationErrorKind::TypeMismatch { expected } => {
                write!(f, "must be of type {expected}")
            }
            ValidationErrorKind::LengthOutOfRange { min: Some(min), actual, .. } if actual < min => {
                write!(f, "must be at least {min} characters")
            }
            ValidationErrorKind::LengthOutOfRange { max, .. } => match max {
                Some(max) => write!(f, "must be at most {max} characters"),
                None => write!(f, "has an invalid length"),
            },
            ValidationErrorKind::InvalidFormat { format } => write!(f, "must be a valid {format}"),
            ValidationErrorKind::PatternMismatch { pattern } => {
                write!(f, "does not match pattern {pattern}")
            }
            ValidationErrorKind::RangeViolation { min: Some(min), actual, .. } if actual < min => {
                write!(f, "must be at least {min}")
            }
            ValidationErrorKind::RangeViolation { max, .. } => match max {
                Some(max) => write!(f, "must be at most {max}"),
                None => write!(f, "is out of range"),
            },
            ValidationErrorKind::CustomValidationFailed => write!(f, "failed custom validation"),
        }
    }
}
