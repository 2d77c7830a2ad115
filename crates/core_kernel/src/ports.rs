//! Ports and Adapters Infrastructure
//!
//! The engine never talks to a database or a browser directly. Each domain
//! defines port traits (visit store, run store, source-system driver, portal
//! driver) and adapters implement them: PostgreSQL repositories in `infra_db`,
//! the automation-bridge HTTP client in `infra_bridge`, and scripted in-memory
//! doubles in `test_utils`.
//!
//! All port implementations report failures through [`PortError`] so the
//! stages can classify an error without knowing which adapter produced it:
//! not-found is terminal for the attempt, transient faults stay inside the
//! retry budget, and a lost session aborts the whole batch.

use std::fmt;
use thiserror::Error;

/// Error type for port operations
///
/// Provides a unified error type that all port implementations must use,
/// ensuring consistent error handling across store and driver adapters.
#[derive(Debug, Error)]
pub enum PortError {
    /// The requested entity was not found
    #[error("Not found: {entity_type} with id {id}")]
    NotFound {
        entity_type: String,
        id: String,
    },

    /// A validation error occurred
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    /// Connection to the underlying system failed
    #[error("Connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The operation timed out
    #[error("Timeout after {duration_ms}ms: {operation}")]
    Timeout {
        operation: String,
        duration_ms: u64,
    },

    /// Authentication with the external system failed
    #[error("Unauthorized: {message}")]
    Unauthorized {
        message: String,
    },

    /// The authenticated automation session was lost mid-batch
    ///
    /// Distinct from `Connection` because it is batch-fatal: the remaining
    /// visits cannot be processed on a dead session.
    #[error("Automation session lost: {system}")]
    SessionLost {
        system: String,
    },

    /// The external system is unavailable
    #[error("Service unavailable: {service}")]
    ServiceUnavailable {
        service: String,
    },

    /// An internal error occurred
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl PortError {
    /// Creates a NotFound error
    pub fn not_found(entity_type: impl Into<String>, id: impl fmt::Display) -> Self {
        PortError::NotFound {
            entity_type: entity_type.into(),
            id: id.to_string(),
        }
    }

    /// Creates a Validation error
    pub fn validation(message: impl Into<String>) -> Self {
        PortError::Validation {
            message: message.into(),
            field: None,
        }
    }

    /// Creates a Validation error with field information
    pub fn validation_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        PortError::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a Connection error
    pub fn connection(message: impl Into<String>) -> Self {
        PortError::Connection {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a SessionLost error
    pub fn session_lost(system: impl Into<String>) -> Self {
        PortError::SessionLost {
            system: system.into(),
        }
    }

    /// Creates an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        PortError::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Returns true if this error indicates a transient failure that may succeed on retry
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PortError::Connection { .. }
                | PortError::Timeout { .. }
                | PortError::ServiceUnavailable { .. }
        )
    }

    /// Returns true if this error indicates the entity was not found
    pub fn is_not_found(&self) -> bool {
        matches!(self, PortError::NotFound { .. })
    }

    /// Returns true if this error aborts the batch rather than one visit
    pub fn is_batch_fatal(&self) -> bool {
        matches!(
            self,
            PortError::SessionLost { .. } | PortError::Unauthorized { .. }
        )
    }
}

/// Marker trait for all domain ports
///
/// All port traits should extend this marker to ensure they are
/// thread-safe and can be used in async contexts.
pub trait DomainPort: Send + Sync + 'static {}
