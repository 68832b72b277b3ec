//! Store error taxonomy and sqlx error classification.
//!
//! The retry governor consumes exactly one question from this module: is an
//! error a transient contention signal? Everything else propagates to the
//! caller on first occurrence.

use miette::Diagnostic;
use thiserror::Error;

use crate::model::VerdictParseError;

/// Result alias used across the store.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by the QC store.
#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    /// A database handle could not be obtained or opened. Fatal for the
    /// call; never absorbed by the retry governor.
    #[error("connection error: {message}")]
    #[diagnostic(
        code(qcledger::store::connection),
        help("Check the database URL, file permissions, and pool limits.")
    )]
    Connection { message: String },

    /// The retry budget was exhausted while the write lock was held
    /// elsewhere. The store is unchanged; the caller may try again shortly.
    #[error("write contention: still locked after {attempts} attempts")]
    #[diagnostic(
        code(qcledger::store::contention),
        help("Another station holds the write lock; retry shortly.")
    )]
    WriteContention { attempts: u32 },

    /// Malformed input, rejected before any store access.
    #[error("validation error: {message}")]
    #[diagnostic(code(qcledger::store::validation))]
    Validation { message: String },

    /// A unique-key or foreign-key violation. Indicates a logic defect (a
    /// writer bypassing the merge engine), not a transient condition; never
    /// retried.
    #[error("integrity violation: {message}")]
    #[diagnostic(
        code(qcledger::store::integrity),
        help("Check rows must only be written through the merge engine.")
    )]
    Integrity { message: String },

    /// Any other driver error, propagated immediately.
    #[error("backend error: {0}")]
    #[diagnostic(code(qcledger::store::backend))]
    Backend(#[source] sqlx::Error),
}

impl StoreError {
    /// Convenience constructor for validation failures.
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        StoreError::Validation {
            message: message.into(),
        }
    }

    /// True when this error is a transient lock/serialization signal the
    /// retry governor may absorb.
    ///
    /// SQLite reports `SQLITE_BUSY`/`SQLITE_LOCKED` (result codes 5 and 6,
    /// "database is locked"/"database table is locked" messages); Postgres
    /// reports serialization failure (SQLSTATE 40001) or deadlock
    /// (SQLSTATE 40P01).
    #[must_use]
    pub fn is_contention(&self) -> bool {
        let StoreError::Backend(sqlx::Error::Database(db_err)) = self else {
            return false;
        };
        if let Some(code) = db_err.code() {
            if matches!(code.as_ref(), "5" | "6" | "40001" | "40P01") {
                return true;
            }
        }
        let message = db_err.message().to_ascii_lowercase();
        message.contains("locked") || message.contains("busy") || message.contains("deadlock")
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => StoreError::Connection {
                message: err.to_string(),
            },
            sqlx::Error::Database(db_err)
                if matches!(
                    db_err.kind(),
                    sqlx::error::ErrorKind::UniqueViolation
                        | sqlx::error::ErrorKind::ForeignKeyViolation
                ) =>
            {
                StoreError::Integrity {
                    message: db_err.to_string(),
                }
            }
            other => StoreError::Backend(other),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StoreError::Connection {
            message: format!("migration failure: {err}"),
        }
    }
}

// A verdict column holding foreign text means something other than the merge
// engine wrote it.
impl From<VerdictParseError> for StoreError {
    fn from(err: VerdictParseError) -> Self {
        StoreError::Integrity {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_timeout_is_a_connection_error() {
        let err = StoreError::from(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, StoreError::Connection { .. }));
        assert!(!err.is_contention());
    }

    #[test]
    fn row_not_found_is_backend_not_contention() {
        let err = StoreError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, StoreError::Backend(_)));
        assert!(!err.is_contention());
    }

    #[test]
    fn validation_is_never_contention() {
        assert!(!StoreError::validation("empty pack id").is_contention());
    }
}
