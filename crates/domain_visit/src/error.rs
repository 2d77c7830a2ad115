//! Visit domain error types

use thiserror::Error;

/// Errors raised by the visit aggregate
#[derive(Debug, Error)]
pub enum VisitError {
    /// The detail state machine rejected a transition
    #[error("Invalid details transition: {from} -> {to}")]
    InvalidStatusTransition { from: String, to: String },
}
