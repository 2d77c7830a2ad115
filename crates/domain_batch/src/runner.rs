//! Resumable batch runner
//!
//! Generic sequential processor shared by the enhancement and submission
//! stages. Given a candidate list and an idempotency policy it decides which
//! items to (re)process, drives them strictly one at a time in the supplied
//! order, and keeps the run record current after every item. A single bad
//! record never aborts the batch; a lost automation session or an unreachable
//! store does.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{error, info, warn};

use core_kernel::PortError;

use crate::error::BatchError;
use crate::run::{RunStatus, RunType};
use crate::tracker::{FinalizerRegistry, RunTracker};

/// Idempotency policy evaluated per item, before any driver interaction
#[derive(Debug, Clone, Serialize)]
pub struct BatchPolicy {
    /// Attempt budget for failed items
    pub max_retries: u32,
    /// Reprocess even completed items
    pub force: bool,
    /// Restrict processing to currently-failed items, bypassing the attempt budget
    pub retry_failed_only: bool,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            force: false,
            retry_failed_only: false,
        }
    }
}

/// Stage-level view of an item's processing status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Unset,
    InProgress,
    Completed,
    Failed,
}

/// Status plus attempt count, as read from the record store
#[derive(Debug, Clone, Copy)]
pub struct StageState {
    pub status: StageStatus,
    pub attempts: u32,
}

impl StageState {
    pub fn new(status: StageStatus, attempts: u32) -> Self {
        Self { status, attempts }
    }
}

/// Per-item decision produced by [`decide`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Process,
    SkipCompleted,
    SkipRetriesExhausted,
    SkipNotFailed,
}

impl Decision {
    pub fn is_skip(&self) -> bool {
        !matches!(self, Decision::Process)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Process => "process",
            Decision::SkipCompleted => "skip_completed",
            Decision::SkipRetriesExhausted => "skip_retries_exhausted",
            Decision::SkipNotFailed => "skip_not_failed",
        }
    }
}

/// Pure skip/process decision, unit-testable away from any store or driver
///
/// - `force` reprocesses everything, including completed items.
/// - `retry_failed_only` restricts the batch to currently-failed items and
///   deliberately ignores the attempt budget: the operator asked for the
///   failures back.
/// - Otherwise completed items are skipped, and failed items are skipped once
///   their attempts have reached the budget.
pub fn decide(state: StageState, policy: &BatchPolicy) -> Decision {
    if policy.force {
        return Decision::Process;
    }

    if policy.retry_failed_only {
        return if state.status == StageStatus::Failed {
            Decision::Process
        } else {
            Decision::SkipNotFailed
        };
    }

    match state.status {
        StageStatus::Completed => Decision::SkipCompleted,
        StageStatus::Failed if state.attempts >= policy.max_retries => {
            Decision::SkipRetriesExhausted
        }
        _ => Decision::Process,
    }
}

/// Result of processing one item
#[derive(Debug, Clone)]
pub enum StageOutcome {
    /// The item was processed to completion
    Completed,
    /// The stage recorded a per-item failure and the batch may continue
    Failed { error: String },
    /// Deliberate do-nothing outcome (not implemented portal, unknown pay type)
    NoOp { reason: String },
}

/// Error raised by a stage while processing
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// Failure scoped to the current item; recorded, then the batch continues
    #[error("{0}")]
    Item(#[source] PortError),

    /// Failure that invalidates the rest of the batch
    #[error("batch-fatal: {0}")]
    Fatal(#[source] PortError),
}

impl From<PortError> for StageError {
    fn from(error: PortError) -> Self {
        if error.is_batch_fatal() {
            StageError::Fatal(error)
        } else {
            StageError::Item(error)
        }
    }
}

/// A pipeline stage the runner can drive
///
/// One authenticated driver session is shared across the whole batch:
/// `prepare` runs once before the first item, `finish` once after the last.
#[async_trait]
pub trait StageProcessor<I>: Send + Sync {
    /// Run type recorded for this stage's batches
    fn run_type(&self) -> RunType;

    /// Stable identifier used in reports and logs
    fn item_id(&self, item: &I) -> String;

    /// Reads the stage-relevant status block from the item
    fn stage_state(&self, item: &I) -> StageState;

    /// One-time session setup (authentication); failure is batch-fatal
    async fn prepare(&self) -> Result<(), StageError>;

    /// Processes a single item
    async fn process(&self, item: &I) -> Result<StageOutcome, StageError>;

    /// One-time session teardown after the batch
    async fn finish(&self) {}
}

/// Outcome recorded for one item in the batch report
#[derive(Debug, Clone)]
pub enum ItemOutcome {
    Completed,
    Failed { error: String },
    Skipped { decision: Decision },
    NoOp { reason: String },
}

/// Per-item entry in the batch report
#[derive(Debug, Clone)]
pub struct ItemReport {
    pub item_id: String,
    pub outcome: ItemOutcome,
}

/// Aggregate result of one batch run
#[derive(Debug)]
pub struct BatchReport {
    pub run_id: core_kernel::RunId,
    pub total: u32,
    pub completed: u32,
    pub failed: u32,
    pub skipped: u32,
    pub results: Vec<ItemReport>,
}

impl BatchReport {
    /// Ids and reasons for failed items, capped for summary output
    pub fn failure_sample(&self, limit: usize) -> Vec<(&str, &str)> {
        self.results
            .iter()
            .filter_map(|r| match &r.outcome {
                ItemOutcome::Failed { error } => Some((r.item_id.as_str(), error.as_str())),
                _ => None,
            })
            .take(limit)
            .collect()
    }
}

/// Drives a stage over a candidate list, one item at a time
pub struct BatchRunner {
    tracker: RunTracker,
}

impl BatchRunner {
    pub fn new(tracker: RunTracker) -> Self {
        Self { tracker }
    }

    /// Runs the stage over `items` in the order supplied.
    ///
    /// The run record is created before the first item and registered with
    /// `registry` so abnormal process exit still finalizes it. The run ends
    /// `Completed` whenever the runner reaches the end of the list, even if
    /// individual items failed; only batch-fatal conditions end it `Failed`.
    pub async fn run<I, P>(
        &self,
        processor: &P,
        items: &[I],
        policy: &BatchPolicy,
        registry: &FinalizerRegistry,
    ) -> Result<BatchReport, BatchError>
    where
        I: Sync,
        P: StageProcessor<I>,
    {
        let metadata = serde_json::json!({
            "policy": policy,
            "total_candidates": items.len(),
        });

        let handle = self
            .tracker
            .start(processor.run_type(), metadata)
            .await
            .map_err(BatchError::Store)?;
        registry.register(handle.crash_finalizer()).await;

        handle
            .update(crate::ports::RunPatch::default().with_total(items.len() as u32))
            .await
            .map_err(BatchError::Store)?;

        if let Err(error) = processor.prepare().await {
            let message = format!("stage preparation failed: {}", error);
            handle
                .finalize(RunStatus::Failed, Some(message.clone()))
                .await
                .map_err(BatchError::Store)?;
            return Err(BatchError::Fatal(message));
        }

        let mut report = BatchReport {
            run_id: handle.id(),
            total: items.len() as u32,
            completed: 0,
            failed: 0,
            skipped: 0,
            results: Vec::with_capacity(items.len()),
        };

        let mut fatal: Option<String> = None;

        for item in items {
            let item_id = processor.item_id(item);
            let decision = decide(processor.stage_state(item), policy);

            if decision.is_skip() {
                info!(item = %item_id, decision = decision.as_str(), "skipping");
                report.skipped += 1;
                report.results.push(ItemReport {
                    item_id,
                    outcome: ItemOutcome::Skipped { decision },
                });
            } else {
                match processor.process(item).await {
                    Ok(StageOutcome::Completed) => {
                        report.completed += 1;
                        report.results.push(ItemReport {
                            item_id,
                            outcome: ItemOutcome::Completed,
                        });
                    }
                    Ok(StageOutcome::NoOp { reason }) => {
                        info!(item = %item_id, %reason, "no-op outcome");
                        report.skipped += 1;
                        report.results.push(ItemReport {
                            item_id,
                            outcome: ItemOutcome::NoOp { reason },
                        });
                    }
                    Ok(StageOutcome::Failed { error }) => {
                        warn!(item = %item_id, %error, "item failed");
                        report.failed += 1;
                        report.results.push(ItemReport {
                            item_id,
                            outcome: ItemOutcome::Failed { error },
                        });
                    }
                    Err(StageError::Item(source)) => {
                        warn!(item = %item_id, error = %source, "item failed");
                        report.failed += 1;
                        report.results.push(ItemReport {
                            item_id,
                            outcome: ItemOutcome::Failed {
                                error: source.to_string(),
                            },
                        });
                    }
                    Err(StageError::Fatal(source)) => {
                        error!(item = %item_id, error = %source, "batch-fatal error");
                        report.failed += 1;
                        report.results.push(ItemReport {
                            item_id,
                            outcome: ItemOutcome::Failed {
                                error: source.to_string(),
                            },
                        });
                        fatal = Some(source.to_string());
                    }
                }
            }

            // Keep the externally observable run record close to current.
            handle
                .update(crate::ports::RunPatch::progress(
                    report.completed,
                    report.failed,
                    report.skipped,
                ))
                .await
                .map_err(BatchError::Store)?;

            if fatal.is_some() {
                break;
            }
        }

        processor.finish().await;

        match fatal {
            Some(message) => {
                handle
                    .finalize(RunStatus::Failed, Some(message.clone()))
                    .await
                    .map_err(BatchError::Store)?;
                Err(BatchError::Fatal(message))
            }
            None => {
                handle
                    .finalize(RunStatus::Completed, None)
                    .await
                    .map_err(BatchError::Store)?;
                Ok(report)
            }
        }
    }
}
