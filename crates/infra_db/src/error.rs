//! Database error types

use thiserror::Error;

use core_kernel::PortError;

/// Errors that can occur during database operations
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to establish a database connection
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Entity not found in database
    #[error("Entity not found: {0}")]
    NotFound(String),

    /// Migration error
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Generic SQL error
    #[error("SQL error: {0}")]
    SqlError(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Checks if this error is a connection-related issue
    pub fn is_connection_error(&self) -> bool {
        matches!(self, DatabaseError::ConnectionFailed(_))
    }
}

/// Maps a SQLx error to the shared port error taxonomy
///
/// I/O and pool faults become `Connection` (transient, batch-fatal for the
/// runner via `is_transient`); everything else is an internal fault. Row
/// absence is handled at each call site where the entity id is known.
pub fn map_sqlx(error: sqlx::Error) -> PortError {
    match &error {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            PortError::connection(error.to_string())
        }
        _ => PortError::internal(error.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_timeout_maps_to_transient() {
        let mapped = map_sqlx(sqlx::Error::PoolTimedOut);
        assert!(mapped.is_transient());
    }

    #[test]
    fn test_row_not_found_is_not_transient() {
        let mapped = map_sqlx(sqlx::Error::RowNotFound);
        assert!(!mapped.is_transient());
    }
}
