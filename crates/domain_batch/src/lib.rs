//! Batch Execution Domain
//!
//! This crate implements the workflow-control core shared by every stage of
//! the claims pipeline: run-level telemetry that survives crashes, and the
//! generic resumable batch runner with its idempotency policy.
//!
//! # Run Lifecycle
//!
//! ```text
//! Running -> Completed            (runner reached the end of the list)
//! Running -> Failed               (batch-fatal error, or crash finalizer)
//! ```
//!
//! A run that reaches `Running` always reaches a terminal status: the
//! [`tracker::CrashFinalizer`] registered at batch start is invoked by the
//! process's top-level shutdown path and marks any still-running run as
//! failed, idempotently.

pub mod run;
pub mod tracker;
pub mod runner;
pub mod ports;
pub mod error;

pub use run::{Run, RunType, RunStatus};
pub use tracker::{RunTracker, RunHandle, CrashFinalizer, FinalizerRegistry};
pub use runner::{
    BatchRunner, BatchPolicy, BatchReport, ItemReport, ItemOutcome,
    StageProcessor, StageState, StageStatus, StageOutcome, StageError,
    Decision, decide,
};
pub use ports::{RunStore, RunPatch};
pub use error::BatchError;
