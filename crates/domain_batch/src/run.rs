//! Run aggregate
//!
//! One `Run` row is created per batch invocation, independent of individual
//! visit outcomes. Its counters are refreshed after every processed visit so
//! an externally observed run record is always close to current, even
//! mid-batch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::RunId;

/// Which pipeline stage a run executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunType {
    /// Patient-queue extraction from the clinic system
    QueueExtraction,
    /// Clinical detail enhancement batch
    Enhancement,
    /// Claim routing and submission batch
    Submission,
}

impl RunType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunType::QueueExtraction => "queue_extraction",
            RunType::Enhancement => "enhancement",
            RunType::Submission => "submission",
        }
    }
}

/// Run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    /// True for statuses a run may legally end in
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

/// One execution of a batch stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    /// Unique identifier
    pub id: RunId,
    /// Stage this run executed
    pub run_type: RunType,
    /// Current status
    pub status: RunStatus,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the run reached a terminal status
    pub finished_at: Option<DateTime<Utc>>,
    /// Input parameters (scope, policy flags) for auditability
    pub metadata: serde_json::Value,
    /// Number of candidate records handed to the runner
    pub total_records: u32,
    /// Records processed to completion
    pub completed_count: u32,
    /// Records that failed processing
    pub failed_count: u32,
    /// Records skipped by the idempotency policy or routed to a no-op
    pub skipped_count: u32,
    /// Batch-level error message, if the run failed
    pub error_message: Option<String>,
}

impl Run {
    /// Creates a new run in `Running` status
    pub fn start(run_type: RunType, metadata: serde_json::Value) -> Self {
        Self {
            id: RunId::new_v7(),
            run_type,
            status: RunStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            metadata,
            total_records: 0,
            completed_count: 0,
            failed_count: 0,
            skipped_count: 0,
            error_message: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_is_running() {
        let run = Run::start(RunType::Enhancement, serde_json::json!({"force": false}));
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.finished_at.is_none());
        assert_eq!(run.completed_count, 0);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
    }
}
