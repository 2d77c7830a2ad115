//! Tests for the resumable batch runner and the run tracker

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use core_kernel::{DomainPort, PortError, RunId};
use domain_batch::{
    decide, BatchError, BatchPolicy, BatchRunner, CrashFinalizer, Decision, FinalizerRegistry,
    Run, RunPatch, RunStatus, RunStore, RunTracker, RunType, StageError, StageOutcome,
    StageProcessor, StageState, StageStatus,
};
use proptest::prelude::*;

// ============================================================================
// Test doubles
// ============================================================================

#[derive(Default)]
struct MemoryRunStore {
    runs: Mutex<HashMap<RunId, Run>>,
}

impl DomainPort for MemoryRunStore {}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn create(&self, run: &Run) -> Result<(), PortError> {
        self.runs.lock().await.insert(run.id, run.clone());
        Ok(())
    }

    async fn update(&self, id: RunId, patch: RunPatch) -> Result<(), PortError> {
        let mut runs = self.runs.lock().await;
        let run = runs
            .get_mut(&id)
            .ok_or_else(|| PortError::not_found("Run", id))?;
        if let Some(status) = patch.status {
            run.status = status;
        }
        if let Some(total) = patch.total_records {
            run.total_records = total;
        }
        if let Some(completed) = patch.completed_count {
            run.completed_count = completed;
        }
        if let Some(failed) = patch.failed_count {
            run.failed_count = failed;
        }
        if let Some(skipped) = patch.skipped_count {
            run.skipped_count = skipped;
        }
        if let Some(finished_at) = patch.finished_at {
            run.finished_at = Some(finished_at);
        }
        if patch.error_message.is_some() {
            run.error_message = patch.error_message;
        }
        Ok(())
    }

    async fn get(&self, id: RunId) -> Result<Run, PortError> {
        self.runs
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| PortError::not_found("Run", id))
    }
}

#[derive(Clone)]
struct TestItem {
    id: &'static str,
    status: StageStatus,
    attempts: u32,
}

fn item(id: &'static str, status: StageStatus, attempts: u32) -> TestItem {
    TestItem {
        id,
        status,
        attempts,
    }
}

/// Stage double: fails items in `failing`, raises a fatal error on `fatal_on`.
struct TestStage {
    failing: Vec<&'static str>,
    fatal_on: Option<&'static str>,
    processed: AtomicU32,
}

impl TestStage {
    fn new() -> Self {
        Self {
            failing: Vec::new(),
            fatal_on: None,
            processed: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl StageProcessor<TestItem> for TestStage {
    fn run_type(&self) -> RunType {
        RunType::Enhancement
    }

    fn item_id(&self, item: &TestItem) -> String {
        item.id.to_string()
    }

    fn stage_state(&self, item: &TestItem) -> StageState {
        StageState::new(item.status, item.attempts)
    }

    async fn prepare(&self) -> Result<(), StageError> {
        Ok(())
    }

    async fn process(&self, item: &TestItem) -> Result<StageOutcome, StageError> {
        self.processed.fetch_add(1, Ordering::SeqCst);

        if self.fatal_on == Some(item.id) {
            return Err(StageError::Fatal(PortError::session_lost("clinic")));
        }
        if self.failing.contains(&item.id) {
            return Ok(StageOutcome::Failed {
                error: "simulated failure".to_string(),
            });
        }
        Ok(StageOutcome::Completed)
    }
}

fn runner_with_store() -> (BatchRunner, Arc<MemoryRunStore>) {
    let store = Arc::new(MemoryRunStore::default());
    let tracker = RunTracker::new(store.clone() as Arc<dyn RunStore>);
    (BatchRunner::new(tracker), store)
}

// ============================================================================
// Runner tests
// ============================================================================

#[tokio::test]
async fn mixed_batch_processes_only_pending_items() {
    // 5 visits: 2 completed, 3 unset, force=false -> exactly 3 processed.
    let (runner, store) = runner_with_store();
    let stage = TestStage::new();
    let registry = FinalizerRegistry::new();

    let items = vec![
        item("a", StageStatus::Completed, 0),
        item("b", StageStatus::Unset, 0),
        item("c", StageStatus::Completed, 0),
        item("d", StageStatus::Unset, 0),
        item("e", StageStatus::Unset, 0),
    ];

    let report = runner
        .run(&stage, &items, &BatchPolicy::default(), &registry)
        .await
        .unwrap();

    assert_eq!(stage.processed.load(Ordering::SeqCst), 3);
    assert_eq!(report.total, 5);
    assert_eq!(report.completed, 3);
    assert_eq!(report.skipped, 2);

    let run = store.get(report.run_id).await.unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.completed_count + run.failed_count, 3);
    assert_eq!(run.total_records, 5);
}

#[tokio::test]
async fn completed_only_batch_is_a_no_op() {
    let (runner, _store) = runner_with_store();
    let stage = TestStage::new();
    let registry = FinalizerRegistry::new();

    let items = vec![
        item("a", StageStatus::Completed, 0),
        item("b", StageStatus::Completed, 2),
    ];

    let report = runner
        .run(&stage, &items, &BatchPolicy::default(), &registry)
        .await
        .unwrap();

    assert_eq!(stage.processed.load(Ordering::SeqCst), 0);
    assert_eq!(report.skipped, 2);
}

#[tokio::test]
async fn exhausted_retry_budget_is_skipped() {
    let (runner, _store) = runner_with_store();
    let stage = TestStage::new();
    let registry = FinalizerRegistry::new();

    let policy = BatchPolicy {
        max_retries: 3,
        ..Default::default()
    };
    let items = vec![item("worn-out", StageStatus::Failed, 3)];

    let report = runner.run(&stage, &items, &policy, &registry).await.unwrap();

    assert_eq!(stage.processed.load(Ordering::SeqCst), 0);
    assert_eq!(report.skipped, 1);
}

#[tokio::test]
async fn item_failure_does_not_abort_the_batch() {
    let (runner, store) = runner_with_store();
    let mut stage = TestStage::new();
    stage.failing = vec!["bad"];
    let registry = FinalizerRegistry::new();

    let items = vec![
        item("good-1", StageStatus::Unset, 0),
        item("bad", StageStatus::Unset, 0),
        item("good-2", StageStatus::Unset, 0),
    ];

    let report = runner
        .run(&stage, &items, &BatchPolicy::default(), &registry)
        .await
        .unwrap();

    assert_eq!(report.completed, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.failure_sample(10).len(), 1);

    // Per-item failures still end the run Completed.
    let run = store.get(report.run_id).await.unwrap();
    assert_eq!(run.status, RunStatus::Completed);
}

#[tokio::test]
async fn fatal_error_aborts_and_fails_the_run() {
    let (runner, store) = runner_with_store();
    let mut stage = TestStage::new();
    stage.fatal_on = Some("killer");
    let registry = FinalizerRegistry::new();

    let items = vec![
        item("first", StageStatus::Unset, 0),
        item("killer", StageStatus::Unset, 0),
        item("never-reached", StageStatus::Unset, 0),
    ];

    let result = runner
        .run(&stage, &items, &BatchPolicy::default(), &registry)
        .await;

    assert!(matches!(result, Err(BatchError::Fatal(_))));
    // The item after the fatal one was never touched.
    assert_eq!(stage.processed.load(Ordering::SeqCst), 2);

    let runs = store.runs.lock().await;
    let run = runs.values().next().unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.error_message.as_deref().unwrap().contains("session lost"));
}

// ============================================================================
// Tracker tests
// ============================================================================

#[tokio::test]
async fn crash_finalizer_marks_interrupted_run_failed() {
    let store = Arc::new(MemoryRunStore::default());
    let tracker = RunTracker::new(store.clone() as Arc<dyn RunStore>);

    let handle = tracker
        .start(RunType::Submission, serde_json::json!({}))
        .await
        .unwrap();
    let finalizer: CrashFinalizer = handle.crash_finalizer();

    // Simulated process termination: the handle is dropped without finalize.
    drop(handle);
    finalizer.finalize_crashed().await;

    let runs = store.runs.lock().await;
    let run = runs.values().next().unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.finished_at.is_some());
    assert!(run
        .error_message
        .as_deref()
        .unwrap()
        .contains("process terminated"));
}

#[tokio::test]
async fn crash_finalizer_is_a_no_op_after_explicit_finalize() {
    let store = Arc::new(MemoryRunStore::default());
    let tracker = RunTracker::new(store.clone() as Arc<dyn RunStore>);

    let handle = tracker
        .start(RunType::Enhancement, serde_json::json!({}))
        .await
        .unwrap();
    let finalizer = handle.crash_finalizer();

    handle.finalize(RunStatus::Completed, None).await.unwrap();
    finalizer.finalize_crashed().await;

    let runs = store.runs.lock().await;
    let run = runs.values().next().unwrap();
    // The crash finalizer must not overwrite the real outcome.
    assert_eq!(run.status, RunStatus::Completed);
    assert!(run.error_message.is_none());
}

#[tokio::test]
async fn explicit_finalize_is_idempotent() {
    let store = Arc::new(MemoryRunStore::default());
    let tracker = RunTracker::new(store.clone() as Arc<dyn RunStore>);

    let handle = tracker
        .start(RunType::Enhancement, serde_json::json!({}))
        .await
        .unwrap();

    handle.finalize(RunStatus::Completed, None).await.unwrap();
    handle
        .finalize(RunStatus::Failed, Some("should be ignored".to_string()))
        .await
        .unwrap();

    let runs = store.runs.lock().await;
    assert_eq!(runs.values().next().unwrap().status, RunStatus::Completed);
}

#[tokio::test]
async fn registry_finalizes_every_registered_run() {
    let store = Arc::new(MemoryRunStore::default());
    let tracker = RunTracker::new(store.clone() as Arc<dyn RunStore>);
    let registry = FinalizerRegistry::new();

    for _ in 0..3 {
        let handle = tracker
            .start(RunType::Enhancement, serde_json::json!({}))
            .await
            .unwrap();
        registry.register(handle.crash_finalizer()).await;
    }

    registry.finalize_all().await;

    let runs = store.runs.lock().await;
    assert_eq!(runs.len(), 3);
    assert!(runs.values().all(|r| r.status == RunStatus::Failed));
}

// ============================================================================
// Decision property tests
// ============================================================================

fn any_status() -> impl Strategy<Value = StageStatus> {
    prop_oneof![
        Just(StageStatus::Unset),
        Just(StageStatus::InProgress),
        Just(StageStatus::Completed),
        Just(StageStatus::Failed),
    ]
}

proptest! {
    #[test]
    fn force_always_processes(status in any_status(), attempts in 0u32..100, max_retries in 0u32..10) {
        let policy = BatchPolicy { max_retries, force: true, retry_failed_only: false };
        prop_assert_eq!(decide(StageState::new(status, attempts), &policy), Decision::Process);
    }

    #[test]
    fn without_force_completed_never_processes(attempts in 0u32..100, max_retries in 0u32..10, retry_failed_only in any::<bool>()) {
        let policy = BatchPolicy { max_retries, force: false, retry_failed_only };
        let decision = decide(StageState::new(StageStatus::Completed, attempts), &policy);
        prop_assert!(decision.is_skip());
    }

    #[test]
    fn failed_within_budget_processes(max_retries in 1u32..10) {
        let policy = BatchPolicy { max_retries, force: false, retry_failed_only: false };
        let decision = decide(StageState::new(StageStatus::Failed, max_retries - 1), &policy);
        prop_assert_eq!(decision, Decision::Process);
    }
}
