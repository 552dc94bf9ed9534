//! Error taxonomy shared by every component of the tracking engine.
//!
//! Every error carries a kind (the enum variant), a human-readable message,
//! and where applicable an underlying cause accessible via `std::error::Error::source`.

use std::path::PathBuf;

/// Sub-classification of [`RagError::Storage`], mirrored from spec §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorKind {
    /// A unique/foreign-key constraint was violated (e.g. version-number race).
    Constraint,
    /// The backend could not be reached.
    Connectivity,
    /// The operation exceeded its configured timeout.
    Timeout,
    /// Any other backend failure.
    Other,
}

impl std::fmt::Display for StorageErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StorageErrorKind::Constraint => "constraint",
            StorageErrorKind::Connectivity => "connectivity",
            StorageErrorKind::Timeout => "timeout",
            StorageErrorKind::Other => "other",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RagError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("file too large: {path} is {size} bytes, max is {max} bytes")]
    FileTooLarge { path: PathBuf, size: u64, max: u64 },

    #[error("unsupported format: no parser for {path} and content is not valid UTF-8")]
    UnsupportedFormat { path: PathBuf },

    #[error("parse error for {path}: {message}")]
    ParseError {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    #[error("storage error ({kind}): {message}")]
    Storage {
        kind: StorageErrorKind,
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("cancelled")]
    Cancelled,

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RagError {
    pub fn storage(kind: StorageErrorKind, message: impl Into<String>) -> Self {
        RagError::Storage { kind, message: message.into(), source: None }
    }

    pub fn storage_with_cause(
        kind: StorageErrorKind,
        message: impl Into<String>,
        cause: impl Into<anyhow::Error>,
    ) -> Self {
        RagError::Storage { kind, message: message.into(), source: Some(cause.into()) }
    }

    pub fn parse(path: PathBuf, message: impl Into<String>) -> Self {
        RagError::ParseError { path, message: message.into(), source: None }
    }

    /// Whether the caller may reasonably retry the operation unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RagError::Storage { kind: StorageErrorKind::Timeout, .. }
                | RagError::Storage { kind: StorageErrorKind::Connectivity, .. }
                | RagError::Conflict(_)
        )
    }

    /// Taxonomized kind name (spec §7), used to label per-path batch failures.
    pub fn kind_name(&self) -> &'static str {
        match self {
            RagError::NotFound(_) => "NotFound",
            RagError::FileTooLarge { .. } => "FileTooLarge",
            RagError::UnsupportedFormat { .. } => "UnsupportedFormat",
            RagError::ParseError { .. } => "ParseError",
            RagError::Storage { .. } => "StorageError",
            RagError::Conflict(_) => "Conflict",
            RagError::Cancelled => "Cancelled",
            RagError::Config(_) => "ConfigError",
            RagError::Io(_) => "StorageError",
        }
    }
}

impl From<sqlx::Error> for RagError {
    fn from(err: sqlx::Error) -> Self {
        let kind = match &err {
            sqlx::Error::Database(db_err) => match db_err.kind() {
                sqlx::error::ErrorKind::UniqueViolation | sqlx::error::ErrorKind::ForeignKeyViolation => {
                    StorageErrorKind::Constraint
                }
                _ => StorageErrorKind::Other,
            },
            sqlx::Error::PoolTimedOut => StorageErrorKind::Timeout,
            sqlx::Error::Io(_) => StorageErrorKind::Connectivity,
            _ => StorageErrorKind::Other,
        };
        RagError::storage_with_cause(kind, err.to_string(), err)
    }
}

pub type RagResult<T> = Result<T, RagError>;
