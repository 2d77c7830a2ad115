//! Batch-level error types

use thiserror::Error;

use core_kernel::PortError;

/// Errors that abort a whole batch run
///
/// Per-item failures never surface here; they are recorded in the batch
/// report and the runner moves on.
#[derive(Debug, Error)]
pub enum BatchError {
    /// A batch-fatal condition was raised by the stage (lost session,
    /// authentication failure)
    #[error("Batch aborted: {0}")]
    Fatal(String),

    /// The run store itself became unreachable
    #[error("Run store error: {0}")]
    Store(#[source] PortError),
}
