//! Error types for the data-access layer
//!
//! Every failure surfaced to a caller is one of the kinds below, so callers
//! can distinguish a missing row from a constraint violation from their own
//! malformed input without string matching.

use std::fmt;

/// Result type alias for engine operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Error kinds surfaced by the data-access layer
#[derive(Debug, Clone, PartialEq)]
pub enum OrmError {
    /// A unique-keyed read/update/delete matched no row
    NotFound { entity: String },
    /// A write would duplicate a declared unique or compound-unique key
    UniqueViolation { entity: String, key: String },
    /// Caller-supplied filter/argument shape is structurally invalid;
    /// raised before any storage round-trip
    Validation(String),
    /// Connection or configuration failure, or an operation issued outside
    /// the connect/disconnect window
    Initialization(String),
    /// Transaction acquisition, timeout, commit or rollback failure
    Transaction(String),
    /// Storage-engine failure this layer cannot classify
    Unknown(String),
}

impl fmt::Display for OrmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrmError::NotFound { entity } => {
                write!(f, "No {} record matched the given unique key", entity)
            }
            OrmError::UniqueViolation { entity, key } => {
                write!(f, "Unique constraint '{}' violated on {}", key, entity)
            }
            OrmError::Validation(msg) => write!(f, "Validation error: {}", msg),
            OrmError::Initialization(msg) => write!(f, "Initialization error: {}", msg),
            OrmError::Transaction(msg) => write!(f, "Transaction error: {}", msg),
            OrmError::Unknown(msg) => write!(f, "Unknown request error: {}", msg),
        }
    }
}

impl std::error::Error for OrmError {}

impl OrmError {
    pub fn not_found(entity: &str) -> Self {
        OrmError::NotFound {
            entity: entity.to_string(),
        }
    }

    pub fn unique_violation(entity: &str, key: &str) -> Self {
        OrmError::UniqueViolation {
            entity: entity.to_string(),
            key: key.to_string(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        OrmError::Validation(msg.into())
    }

    /// Short machine-readable kind tag, used by the renderers below
    pub fn kind(&self) -> &'static str {
        match self {
            OrmError::NotFound { .. } => "NotFound",
            OrmError::UniqueViolation { .. } => "UniqueViolation",
            OrmError::Validation(_) => "Validation",
            OrmError::Initialization(_) => "Initialization",
            OrmError::Transaction(_) => "Transaction",
            OrmError::Unknown(_) => "Unknown",
        }
    }

    /// Render the error in the client's configured presentation mode.
    /// Cosmetic only: the error value itself is unchanged.
    pub fn render(&self, format: ErrorFormat) -> String {
        match format {
            ErrorFormat::Minimal => self.to_string(),
            ErrorFormat::Colorless => format!("[{}]\n{}", self.kind(), self),
            ErrorFormat::Pretty => {
                format!("\x1b[1;31m[{}]\x1b[0m\n{}", self.kind(), self)
            }
        }
    }
}

/// Presentation mode for rendered error messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorFormat {
    #[default]
    Pretty,
    Colorless,
    Minimal,
}

// Convert from sqlx errors, classifying what we can
impl From<sqlx::Error> for OrmError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => OrmError::NotFound {
                entity: "record".to_string(),
            },
            sqlx::Error::Database(db) => {
                // SQLSTATE 23505 = unique_violation
                if db.code().as_deref() == Some("23505") {
                    OrmError::UniqueViolation {
                        entity: "record".to_string(),
                        key: db.constraint().unwrap_or("unique").to_string(),
                    }
                } else {
                    OrmError::Unknown(db.to_string())
                }
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                OrmError::Initialization(err.to_string())
            }
            _ => OrmError::Unknown(err.to_string()),
        }
    }
}
