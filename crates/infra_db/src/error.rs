//! Database and repository error types
//!
//! Three layers of failure meet here:
//! - [`DatabaseError`]: what a store reports while reading or flushing
//! - [`TrackingError`]: a registration the change tracker refuses
//! - [`RepositoryError`]: what a repository operation hands back to its caller
//!
//! Persistence conflicts never travel as errors past the repository. They are
//! absorbed by the commit recovery and surface as a [`PersistenceFailure`]
//! diagnostic on the context.

use core_kernel::{CoreError, EntityId};
use thiserror::Error;

use crate::tracker::EntryId;

/// Errors reported by a store
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DatabaseError {
    /// Failed to establish a database connection
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Unique constraint violation
    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    /// Foreign key constraint violation
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// Not-null, check or length constraint violation
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// An update or delete matched no stored row
    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    /// Transaction error
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// A stored row could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Pool exhaustion - no available connections
    #[error("Connection pool exhausted")]
    PoolExhausted,
}

impl DatabaseError {
    /// Creates a duplicate entry error
    ///
    /// # Arguments
    ///
    /// * `table` - The table holding the duplicate
    /// * `column` - The unique column
    /// * `value` - The duplicate value
    pub fn duplicate(table: &str, column: &str, value: impl std::fmt::Display) -> Self {
        DatabaseError::DuplicateEntry(format!(
            "{} with {} {} already exists",
            table, column, value
        ))
    }

    /// Creates a concurrency conflict for a row that no longer exists
    pub fn missing_row(table: &str, key: EntityId) -> Self {
        DatabaseError::ConcurrencyConflict(format!(
            "expected one row in {} with id {}, found none",
            table, key
        ))
    }

    /// Checks if this error is a write conflict the commit recovery absorbs
    ///
    /// Constraint violations and rows that vanished under an update or delete
    /// are conflicts; connection and query failures are not.
    pub fn is_update_conflict(&self) -> bool {
        matches!(
            self,
            DatabaseError::DuplicateEntry(_)
                | DatabaseError::ForeignKeyViolation(_)
                | DatabaseError::ConstraintViolation(_)
                | DatabaseError::ConcurrencyConflict(_)
        )
    }

    /// Checks if this error is a connection-related issue
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            DatabaseError::ConnectionFailed(_) | DatabaseError::PoolExhausted
        )
    }
}

/// Converts SQLx errors to more specific DatabaseError variants
///
/// PostgreSQL error codes decide the variant, see
/// https://www.postgresql.org/docs/current/errcodes-appendix.html
impl From<&sqlx::Error> for DatabaseError {
    fn from(error: &sqlx::Error) -> Self {
        match error {
            sqlx::Error::PoolTimedOut => DatabaseError::PoolExhausted,
            sqlx::Error::PoolClosed | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
                DatabaseError::ConnectionFailed(error.to_string())
            }
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                DatabaseError::Decode(error.to_string())
            }
            sqlx::Error::Database(db_err) => {
                let message = db_err.message().to_string();
                match db_err.code().as_deref() {
                    Some("23505") => DatabaseError::DuplicateEntry(message),
                    Some("23503") => DatabaseError::ForeignKeyViolation(message),
                    Some("23502" | "23514" | "22001") => {
                        DatabaseError::ConstraintViolation(message)
                    }
                    Some("40001") => DatabaseError::ConcurrencyConflict(message),
                    _ => DatabaseError::QueryFailed(message),
                }
            }
            _ => DatabaseError::QueryFailed(error.to_string()),
        }
    }
}

impl From<sqlx::Error> for DatabaseError {
    fn from(error: sqlx::Error) -> Self {
        DatabaseError::from(&error)
    }
}

/// Registrations the change tracker refuses
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackingError {
    /// Another entry already tracks this key
    #[error("{entity} with id {id} is already tracked")]
    AlreadyTracked { entity: &'static str, id: EntityId },

    /// The operation needs a stored entity but the key is unassigned
    #[error("cannot {operation} {entity} without an assigned id")]
    MissingKey {
        entity: &'static str,
        operation: &'static str,
    },

    /// The entry is already marked for deletion
    #[error("{entity} with id {id} is marked as deleted")]
    Deleted { entity: &'static str, id: EntityId },

    /// The entry handle does not name a tracked entry
    #[error("entry {0} is not tracked")]
    UnknownEntry(EntryId),
}

/// Errors surfaced by repository operations
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Null sentinel or malformed selection, raised before any store access
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Tracking(#[from] TrackingError),

    /// Store failure that is not a write conflict
    #[error(transparent)]
    Database(#[from] DatabaseError),

    /// A stored record does not map onto the entity type
    #[error(transparent)]
    Mapping(#[from] CoreError),
}

impl RepositoryError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        RepositoryError::InvalidArgument(message.into())
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, RepositoryError::InvalidArgument(_))
    }
}

/// Diagnostic left behind by an absorbed commit failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersistenceFailure {
    /// The flush hit a write conflict and the context was reset
    #[error("persistence conflict: {diagnostic}")]
    Conflict { diagnostic: String },

    /// The follow-up flush after the reset failed as well
    #[error("recovery failed: {diagnostic}")]
    RecoveryFailure { diagnostic: String },
}

impl PersistenceFailure {
    /// Builds the diagnostic from the failed flush and the follow-up attempt
    pub fn from_attempts(original: &DatabaseError, retry: Result<(), DatabaseError>) -> Self {
        match retry {
            Ok(()) => PersistenceFailure::Conflict {
                diagnostic: original.to_string(),
            },
            Err(error) => PersistenceFailure::RecoveryFailure {
                diagnostic: error.to_string(),
            },
        }
    }

    pub fn diagnostic(&self) -> &str {
        match self {
            PersistenceFailure::Conflict { diagnostic }
            | PersistenceFailure::RecoveryFailure { diagnostic } => diagnostic,
        }
    }
}
