//! Claim domain errors

use thiserror::Error;

/// Errors raised by the submission stage
#[derive(Debug, Error)]
pub enum ClaimError {
    /// The visit is missing data the portal requires
    #[error("validation: {message}")]
    Validation { message: String },

    /// A real portal action happened that the safety policy forbids
    #[error("blocked by policy: portal '{portal}' reported a live submission but live submit is not allowed")]
    PolicyBlocked { portal: String },

    /// The portal's re-route instruction could not be completed
    #[error("re-route failed: portal instruction '{instruction}' could not be completed: {detail}")]
    OverrideFailed {
        instruction: String,
        detail: String,
    },
}

impl ClaimError {
    pub fn validation(message: impl Into<String>) -> Self {
        ClaimError::Validation {
            message: message.into(),
        }
    }
}
