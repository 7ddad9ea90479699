//! Error types for the Tether engine.

use crate::CollectionName;
use thiserror::Error;

/// Failure reported by a [`Backend`](crate::Backend) implementation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("backend returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("malformed backend response: {0}")]
    Decode(String),
}

impl BackendError {
    /// Whether this is the "not found" condition.
    pub fn is_not_found(&self) -> bool {
        matches!(self, BackendError::NotFound(_))
    }
}

/// Why a record failed type or format rules.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing required field: {0}")]
    MissingRequiredField(String),

    #[error("type mismatch for field '{field}': expected {expected}, got {got}")]
    TypeMismatch {
        field: String,
        expected: String,
        got: String,
    },

    #[error("invalid {kind} for field '{field}': {value:?}")]
    InvalidFormat {
        field: String,
        kind: String,
        value: String,
    },

    #[error("value {value:?} for field '{field}' is not one of {allowed:?}")]
    UnknownVariant {
        field: String,
        value: String,
        allowed: Vec<String>,
    },

    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

/// The distinguishable failure classes callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    ProtectedCollection,
    Reconciliation,
    Validation,
    MissingFile,
    Transfer,
    Backend,
}

/// All possible errors from the Tether engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// The model declares a mapping that cannot be satisfied.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("'{0}' is a system collection and cannot be created or modified")]
    ProtectedCollection(CollectionName),

    /// Probing remote schema state failed for a reason other than "not found".
    #[error("failed to probe collection '{collection}': {source}")]
    Reconciliation {
        collection: CollectionName,
        source: BackendError,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("no file exists in field '{0}'")]
    MissingFile(String),

    #[error("error fetching file contents: {0}")]
    Transfer(BackendError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Configuration(_) => ErrorKind::Configuration,
            Error::ProtectedCollection(_) => ErrorKind::ProtectedCollection,
            Error::Reconciliation { .. } => ErrorKind::Reconciliation,
            Error::Validation(_) => ErrorKind::Validation,
            Error::MissingFile(_) => ErrorKind::MissingFile,
            Error::Transfer(_) => ErrorKind::Transfer,
            Error::Backend(_) => ErrorKind::Backend,
        }
    }

    pub(crate) fn missing(field: impl Into<String>) -> Self {
        Error::Validation(ValidationError::MissingRequiredField(field.into()))
    }

    pub(crate) fn mismatch(
        field: impl Into<String>,
        expected: impl Into<String>,
        got: impl Into<String>,
    ) -> Self {
        Error::Validation(ValidationError::TypeMismatch {
            field: field.into(),
            expected: expected.into(),
            got: got.into(),
        })
    }

    pub(crate) fn invalid_format(
        field: impl Into<String>,
        kind: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Error::Validation(ValidationError::InvalidFormat {
            field: field.into(),
            kind: kind.into(),
            value: value.into(),
        })
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
