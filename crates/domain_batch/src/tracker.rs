//! Run tracking with crash-safe finalization
//!
//! Every batch creates a run row before touching any visit, and registers a
//! [`CrashFinalizer`] with the process's [`FinalizerRegistry`]. If the process
//! exits abnormally (signal, panic unwound to main, operator kill) the
//! registry still marks the in-flight run as failed. A run stuck in `Running`
//! would otherwise corrupt resumability bookkeeping for later invocations.
//!
//! Finalization is idempotent: the handle and its crash finalizer share one
//! process-local flag, and whichever fires second is a no-op.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use core_kernel::{PortError, RunId};

use crate::ports::{RunPatch, RunStore};
use crate::run::{Run, RunStatus, RunType};

/// Error message recorded by the crash finalizer
pub const CRASH_ERROR_MESSAGE: &str = "process terminated before the run completed";

/// Creates run rows and hands out finalization handles
#[derive(Clone)]
pub struct RunTracker {
    store: Arc<dyn RunStore>,
}

impl RunTracker {
    pub fn new(store: Arc<dyn RunStore>) -> Self {
        Self { store }
    }

    /// Creates a `Running` run row and returns its handle
    pub async fn start(
        &self,
        run_type: RunType,
        metadata: serde_json::Value,
    ) -> Result<RunHandle, PortError> {
        let run = Run::start(run_type, metadata);
        self.store.create(&run).await?;

        info!(run_id = %run.id, run_type = run_type.as_str(), "run started");

        Ok(RunHandle {
            id: run.id,
            store: Arc::clone(&self.store),
            finalized: Arc::new(AtomicBool::new(false)),
        })
    }
}

/// Handle to an in-flight run
#[derive(Clone)]
pub struct RunHandle {
    id: RunId,
    store: Arc<dyn RunStore>,
    finalized: Arc<AtomicBool>,
}

impl RunHandle {
    pub fn id(&self) -> RunId {
        self.id
    }

    /// Applies an incremental update (progress counters, totals)
    pub async fn update(&self, patch: RunPatch) -> Result<(), PortError> {
        self.store.update(self.id, patch).await
    }

    /// Moves the run to a terminal status
    ///
    /// Idempotent: the second and later calls are no-ops, whether they come
    /// from the runner or from the crash finalizer.
    pub async fn finalize(
        &self,
        status: RunStatus,
        error_message: Option<String>,
    ) -> Result<(), PortError> {
        if self.finalized.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        info!(run_id = %self.id, status = status.as_str(), "run finalized");
        self.store
            .update(self.id, RunPatch::finalize(status, error_message))
            .await
    }

    /// Returns a crash finalizer sharing this handle's idempotency flag
    pub fn crash_finalizer(&self) -> CrashFinalizer {
        CrashFinalizer {
            id: self.id,
            store: Arc::clone(&self.store),
            finalized: Arc::clone(&self.finalized),
        }
    }
}

/// Marks a run as failed on abnormal process exit
#[derive(Clone)]
pub struct CrashFinalizer {
    id: RunId,
    store: Arc<dyn RunStore>,
    finalized: Arc<AtomicBool>,
}

impl CrashFinalizer {
    /// If the run was not explicitly finalized, marks it `Failed` with a
    /// generic "process terminated" error. No-op otherwise.
    pub async fn finalize_crashed(&self) {
        if self.finalized.swap(true, Ordering::SeqCst) {
            return;
        }

        warn!(run_id = %self.id, "finalizing run interrupted by process exit");
        let patch = RunPatch::finalize(RunStatus::Failed, Some(CRASH_ERROR_MESSAGE.to_string()));
        if let Err(error) = self.store.update(self.id, patch).await {
            // Nothing left to do on the way out but say so.
            warn!(run_id = %self.id, %error, "crash finalization failed");
        }
    }
}

/// Registry of crash finalizers invoked by the process shutdown path
///
/// The CLI registers every started run here and drives `finalize_all` from
/// its top-level exit handling, both for normal termination and for
/// signal-triggered shutdown.
#[derive(Default)]
pub struct FinalizerRegistry {
    entries: Mutex<Vec<CrashFinalizer>>,
}

impl FinalizerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, finalizer: CrashFinalizer) {
        self.entries.lock().await.push(finalizer);
    }

    /// Invokes every registered finalizer; already-finalized runs are no-ops
    pub async fn finalize_all(&self) {
        let entries = self.entries.lock().await;
        for finalizer in entries.iter() {
            finalizer.finalize_crashed().await;
        }
    }
}
