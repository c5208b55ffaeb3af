//! Error taxonomy for catalog and coverage operations.

use thiserror::Error;

/// Result type alias using CatalogError.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Primary error type for catalog operations.
///
/// Lookup and record errors propagate to the caller as-is. An aborted
/// decode is not an error: readers report it as an absent coverage.
#[derive(Debug, Error)]
pub enum CatalogError {
    // === Lookup Errors ===
    #[error("No record found for {kind} '{key}'")]
    NotFound { kind: &'static str, key: String },

    #[error("Invalid record in {table}: {message}")]
    InvalidRecord { table: &'static str, message: String },

    // === Linear Model Errors ===
    #[error("Descriptor '{0}' has a non-identity distribution and can not be substituted")]
    UnsupportedDistribution(String),

    #[error("Descriptor '{0}' appears in its own expansion")]
    Recursion(String),

    // === Data Errors ===
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Failed to decode image: {0}")]
    Decode(String),

    // === Infrastructure Errors ===
    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Stored geometry could not be transformed. Indicates upstream data corruption.
    #[error("Illegal state: {0}")]
    IllegalState(String),
}

impl CatalogError {
    /// Create a NotFound error.
    pub fn not_found(kind: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            key: key.into(),
        }
    }

    /// Create an InvalidRecord error.
    pub fn invalid_record(table: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            table,
            message: message.into(),
        }
    }

    /// Create an Io error.
    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    /// Create an IllegalState error.
    pub fn illegal_state(msg: impl Into<String>) -> Self {
        Self::IllegalState(msg.into())
    }

    /// Create a Database error.
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Returns true for errors that signal corrupted catalog data rather
    /// than a recoverable condition.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CatalogError::IllegalState(_))
    }

    /// Short machine-readable code, used as a metrics label.
    pub fn code(&self) -> &'static str {
        match self {
            CatalogError::NotFound { .. } => "not_found",
            CatalogError::InvalidRecord { .. } => "invalid_record",
            CatalogError::UnsupportedDistribution(_) => "unsupported_distribution",
            CatalogError::Recursion(_) => "recursion",
            CatalogError::Io(_) => "io",
            CatalogError::Decode(_) => "decode",
            CatalogError::Database(_) => "database",
            CatalogError::Config(_) => "config",
            CatalogError::InvalidArgument(_) => "invalid_argument",
            CatalogError::IllegalState(_) => "illegal_state",
        }
    }
}

impl From<std::io::Error> for CatalogError {
    fn from(err: std::io::Error) -> Self {
        CatalogError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for CatalogError {
    fn from(err: serde_json::Error) -> Self {
        CatalogError::InvalidRecord {
            table: "json",
            message: err.to_string(),
        }
    }
}
