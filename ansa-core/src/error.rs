/// Error taxonomy for the membership core
///
/// Every operation in the ledger, bootstrap, provisioning, and view modules
/// returns `Result<T, LedgerError>`. Each variant carries a human-readable
/// detail and maps to a stable machine-readable kind via [`LedgerError::kind`].
///
/// None of these are transient: the only class a caller may retry is
/// `Database`, and mutating operations stay safe under retry (a retried
/// removal of an already-removed edge reports `NotFound`, it does not
/// corrupt state).
use thiserror::Error;

/// Result type alias for core operations
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Unified error type for the membership core
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Unknown user or workspace
    #[error("Not found: {0}")]
    NotFound(String),

    /// Duplicate username or workspace name, or membership already exists
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Caller lacks the admin role for the target workspace, or bootstrap
    /// has already completed
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The mutation would leave a workspace with zero admins
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Bad credentials or recovery code
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Underlying datastore failure (the only retryable class)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Credential hashing failure
    #[error("Credential error: {0}")]
    Credential(String),
}

impl LedgerError {
    /// Stable machine-readable kind for this error
    ///
    /// These strings are part of the API contract and must not change.
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerError::NotFound(_) => "not_found",
            LedgerError::Conflict(_) => "conflict",
            LedgerError::Forbidden(_) => "forbidden",
            LedgerError::InvariantViolation(_) => "invariant_violation",
            LedgerError::Unauthorized(_) => "unauthorized",
            LedgerError::Database(_) => "database",
            LedgerError::Credential(_) => "credential",
        }
    }

    /// True when the underlying cause is a Postgres unique violation
    ///
    /// Used to translate name/username races into `Conflict` (or the empty
    /// result on the explicit workspace-creation path) instead of a 500.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            LedgerError::Database(sqlx::Error::Database(db_err)) => {
                db_err.code().as_deref() == Some("23505")
            }
            _ => false,
        }
    }
}
