//! Run store port
//!
//! The run tracker persists through this trait. Adapters: the PostgreSQL
//! repository in `infra_db` and the in-memory store in `test_utils`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use core_kernel::{DomainPort, PortError, RunId};

use crate::run::{Run, RunStatus};

/// Partial update applied to a run row
///
/// `None` fields are left untouched, so incremental counter refreshes and
/// terminal finalization share one update path.
#[derive(Debug, Clone, Default)]
pub struct RunPatch {
    pub status: Option<RunStatus>,
    pub total_records: Option<u32>,
    pub completed_count: Option<u32>,
    pub failed_count: Option<u32>,
    pub skipped_count: Option<u32>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl RunPatch {
    /// Patch carrying refreshed progress counters
    pub fn progress(completed: u32, failed: u32, skipped: u32) -> Self {
        Self {
            completed_count: Some(completed),
            failed_count: Some(failed),
            skipped_count: Some(skipped),
            ..Default::default()
        }
    }

    /// Patch that moves the run to a terminal status
    pub fn finalize(status: RunStatus, error_message: Option<String>) -> Self {
        Self {
            status: Some(status),
            finished_at: Some(Utc::now()),
            error_message,
            ..Default::default()
        }
    }

    /// Sets the candidate total
    pub fn with_total(mut self, total: u32) -> Self {
        self.total_records = Some(total);
        self
    }
}

/// Persistence port for run records
#[async_trait]
pub trait RunStore: DomainPort {
    /// Inserts a new run row
    async fn create(&self, run: &Run) -> Result<(), PortError>;

    /// Applies a partial update to an existing run
    async fn update(&self, id: RunId, patch: RunPatch) -> Result<(), PortError>;

    /// Fetches a run by id
    async fn get(&self, id: RunId) -> Result<Run, PortError>;
}
