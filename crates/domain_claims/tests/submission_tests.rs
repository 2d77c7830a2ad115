//! Tests for routing, the submission stage, and the safety gate

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use core_kernel::{DomainPort, Nric, PortError, VisitId};
use domain_batch::StageError;
use domain_claims::{
    MemberHandle, MemberLookup, OutcomeReason, PortalDriver, SaveReceipt, SubmissionPolicy,
    SubmissionStage,
};
use domain_visit::{
    ChargeType, DetailsUpdate, MedicineLine, SubmissionRecord, SubmissionStatus, Visit,
    VisitQuery, VisitStore,
};

// ============================================================================
// Test doubles
// ============================================================================

#[derive(Default)]
struct MemoryVisitStore {
    visits: Mutex<HashMap<VisitId, Visit>>,
}

impl MemoryVisitStore {
    async fn insert(&self, visit: Visit) {
        self.visits.lock().await.insert(visit.id, visit);
    }

    async fn snapshot(&self, id: VisitId) -> Visit {
        self.visits.lock().await.get(&id).cloned().unwrap()
    }
}

impl DomainPort for MemoryVisitStore {}

#[async_trait]
impl VisitStore for MemoryVisitStore {
    async fn get(&self, id: VisitId) -> Result<Visit, PortError> {
        self.visits
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| PortError::not_found("Visit", id))
    }

    async fn find(&self, _query: &VisitQuery) -> Result<Vec<Visit>, PortError> {
        Ok(self.visits.lock().await.values().cloned().collect())
    }

    async fn set_nric(&self, _id: VisitId, _nric: &Nric) -> Result<(), PortError> {
        unimplemented!("not used by submission tests")
    }

    async fn begin_details_attempt(&self, _id: VisitId) -> Result<(), PortError> {
        unimplemented!("not used by submission tests")
    }

    async fn complete_details(
        &self,
        _id: VisitId,
        _update: DetailsUpdate,
    ) -> Result<(), PortError> {
        unimplemented!("not used by submission tests")
    }

    async fn fail_details(&self, _id: VisitId, _error: &str) -> Result<(), PortError> {
        unimplemented!("not used by submission tests")
    }

    async fn record_submission(
        &self,
        id: VisitId,
        record: SubmissionRecord,
    ) -> Result<(), PortError> {
        let mut visits = self.visits.lock().await;
        let visit = visits
            .get_mut(&id)
            .ok_or_else(|| PortError::not_found("Visit", id))?;
        visit.submission.status = if record.submitted {
            SubmissionStatus::Submitted
        } else {
            SubmissionStatus::Draft
        };
        visit.submission.portal = Some(record.portal);
        visit.submission.metadata = Some(record.metadata);
        visit.submission.submitted_at = Some(record.at);
        visit.submission.error = None;
        Ok(())
    }

    async fn record_submission_error(
        &self,
        id: VisitId,
        portal: Option<&str>,
        error: &str,
    ) -> Result<(), PortError> {
        let mut visits = self.visits.lock().await;
        let visit = visits
            .get_mut(&id)
            .ok_or_else(|| PortError::not_found("Visit", id))?;
        visit.submission.status = SubmissionStatus::Error;
        visit.submission.portal = portal.map(str::to_string);
        visit.submission.error = Some(error.to_string());
        Ok(())
    }
}

/// Scripted portal driver that records every call
#[derive(Default)]
struct ScriptedPortal {
    /// Responses for successive `find_member` calls
    lookups: Mutex<VecDeque<Result<MemberLookup, PortError>>>,
    /// Receipt returned by `save_draft`
    receipt: Mutex<Option<SaveReceipt>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedPortal {
    async fn push_lookup(&self, lookup: MemberLookup) {
        self.lookups.lock().await.push_back(Ok(lookup));
    }

    async fn push_lookup_error(&self, error: PortError) {
        self.lookups.lock().await.push_back(Err(error));
    }

    async fn set_receipt(&self, receipt: SaveReceipt) {
        *self.receipt.lock().await = Some(receipt);
    }

    async fn record(&self, call: impl Into<String>) {
        self.calls.lock().await.push(call.into());
    }

    async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }

    async fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }
}

impl DomainPort for ScriptedPortal {}

#[async_trait]
impl PortalDriver for ScriptedPortal {
    async fn authenticate(&self) -> Result<(), PortError> {
        self.record("authenticate").await;
        Ok(())
    }

    async fn select_context(&self, context: &str) -> Result<(), PortError> {
        self.record(format!("select_context:{context}")).await;
        Ok(())
    }

    async fn find_member(&self, nric: &Nric) -> Result<MemberLookup, PortError> {
        self.record(format!("find_member:{nric}")).await;
        self.lookups
            .lock()
            .await
            .pop_front()
            .expect("scripted lookup available")
    }

    async fn open_claim_form(&self, member: &MemberHandle) -> Result<(), PortError> {
        self.record(format!("open_claim_form:{}", member.member_id))
            .await;
        Ok(())
    }

    async fn fill_visit_date(&self, date: NaiveDate) -> Result<(), PortError> {
        self.record(format!("fill_visit_date:{date}")).await;
        Ok(())
    }

    async fn select_charge_type(&self, charge_type: ChargeType) -> Result<(), PortError> {
        self.record(format!("select_charge_type:{}", charge_type.as_str()))
            .await;
        Ok(())
    }

    async fn fill_consultation_fee(&self, amount: Decimal) -> Result<(), PortError> {
        self.record(format!("fill_consultation_fee:{amount}")).await;
        Ok(())
    }

    async fn fill_medical_certificate(
        &self,
        days: u32,
        _start_date: Option<NaiveDate>,
    ) -> Result<(), PortError> {
        self.record(format!("fill_medical_certificate:{days}")).await;
        Ok(())
    }

    async fn select_diagnosis(&self, code: Option<&str>, text: &str) -> Result<(), PortError> {
        self.record(format!(
            "select_diagnosis:{}:{text}",
            code.unwrap_or("-")
        ))
        .await;
        Ok(())
    }

    async fn add_medicine(&self, line: &MedicineLine) -> Result<(), PortError> {
        self.record(format!("add_medicine:{}", line.name)).await;
        Ok(())
    }

    async fn save_draft(&self) -> Result<SaveReceipt, PortError> {
        self.record("save_draft").await;
        Ok(self.receipt.lock().await.clone().unwrap_or(SaveReceipt {
            saved: true,
            submitted: false,
            reference: None,
        }))
    }

    async fn end_session(&self) -> Result<(), PortError> {
        self.record("end_session").await;
        Ok(())
    }
}

// ============================================================================
// Fixtures
// ============================================================================

fn found(member_id: &str, context: &str) -> MemberLookup {
    MemberLookup::Found(MemberHandle {
        member_id: member_id.to_string(),
        context: context.to_string(),
    })
}

fn enhanced_visit(pay_type: &str, nric: Option<&str>) -> Visit {
    let mut visit = Visit::new(
        "Tan Ah Kow",
        NaiveDate::from_ymd_opt(2024, 3, 11).unwrap(),
        pay_type,
    );
    if let Some(n) = nric {
        visit.set_nric(Nric::parse(n).unwrap());
    }
    visit.begin_details_attempt().unwrap();
    visit
        .complete_details(DetailsUpdate {
            diagnosis_text: "Acute pharyngitis".to_string(),
            diagnosis_code: Some("J02.9".to_string()),
            charge_type: Some(ChargeType::First),
            mc_days: 0,
            mc_start_date: None,
            medicines: vec![
                MedicineLine::new("Paracetamol 500mg", "20"),
                MedicineLine::new("PARACETAMOL 500MG", "10"),
                MedicineLine::new("Wound Dressing Kit", "1"),
            ],
            treatment_summary: None,
            sources: serde_json::json!({"source_method": "record_number"}),
        })
        .unwrap();
    visit
}

fn draft_policy() -> SubmissionPolicy {
    SubmissionPolicy {
        save_as_draft: true,
        ..Default::default()
    }
}

fn stage_with(
    store: &Arc<MemoryVisitStore>,
    driver: &Arc<ScriptedPortal>,
    policy: SubmissionPolicy,
) -> SubmissionStage {
    SubmissionStage::new(store.clone(), driver.clone(), policy)
}

// ============================================================================
// Classification
// ============================================================================

#[tokio::test]
async fn unknown_pay_type_is_a_no_op_and_mutates_nothing() {
    let store = Arc::new(MemoryVisitStore::default());
    let driver = Arc::new(ScriptedPortal::default());
    let visit = enhanced_visit("CASH", Some("S1234567A"));
    let id = visit.id;
    store.insert(visit.clone()).await;

    let stage = stage_with(&store, &driver, draft_policy());
    let outcome = stage.submit(&visit).await.unwrap();

    assert!(!outcome.success);
    assert_eq!(outcome.reason, Some(OutcomeReason::UnknownPayType));
    assert!(driver.calls().await.is_empty());
    assert!(!store.snapshot(id).await.submission.is_set());
}

#[tokio::test]
async fn recognized_portal_without_automation_reports_its_name() {
    let store = Arc::new(MemoryVisitStore::default());
    let driver = Arc::new(ScriptedPortal::default());
    let visit = enhanced_visit("IHP", Some("S1234567A"));
    let id = visit.id;
    store.insert(visit.clone()).await;

    let stage = stage_with(&store, &driver, draft_policy());
    let outcome = stage.submit(&visit).await.unwrap();

    assert!(!outcome.success);
    assert_eq!(outcome.reason, Some(OutcomeReason::NotImplemented));
    assert_eq!(outcome.portal.as_deref(), Some("IHP"));
    assert!(driver.calls().await.is_empty());
    assert!(!store.snapshot(id).await.submission.is_set());
}

// ============================================================================
// Identifier precondition
// ============================================================================

#[tokio::test]
async fn missing_identifier_fails_before_any_driver_interaction() {
    let store = Arc::new(MemoryVisitStore::default());
    let driver = Arc::new(ScriptedPortal::default());
    let visit = enhanced_visit("MHC", None);
    store.insert(visit.clone()).await;

    let stage = stage_with(&store, &driver, draft_policy());
    let outcome = stage.submit(&visit).await.unwrap();

    assert!(!outcome.success);
    assert_eq!(outcome.reason, Some(OutcomeReason::ValidationError));
    assert!(driver.calls().await.is_empty());
}

#[tokio::test]
async fn identifier_is_recovered_from_enhancement_metadata() {
    let store = Arc::new(MemoryVisitStore::default());
    let driver = Arc::new(ScriptedPortal::default());
    driver.push_lookup(found("M-1", "default")).await;

    let mut visit = enhanced_visit("MHC", None);
    visit.details.sources = serde_json::json!({
        "source_method": "profile_page",
        "note": "id S7654321B seen on profile header",
    });
    store.insert(visit.clone()).await;

    let stage = stage_with(&store, &driver, draft_policy());
    let outcome = stage.submit(&visit).await.unwrap();

    assert!(outcome.success);
    assert_eq!(driver.count("find_member:S7654321B").await, 1);
}

// ============================================================================
// Search, not-found, one-shot re-route
// ============================================================================

#[tokio::test]
async fn member_not_found_is_its_own_outcome() {
    let store = Arc::new(MemoryVisitStore::default());
    let driver = Arc::new(ScriptedPortal::default());
    driver.push_lookup(MemberLookup::NotFound).await;

    let visit = enhanced_visit("MHC", Some("S1234567A"));
    store.insert(visit.clone()).await;

    let stage = stage_with(&store, &driver, draft_policy());
    let outcome = stage.submit(&visit).await.unwrap();

    assert!(!outcome.success);
    assert_eq!(outcome.reason, Some(OutcomeReason::NotFound));
}

#[tokio::test]
async fn reroute_signal_switches_context_exactly_once() {
    let store = Arc::new(MemoryVisitStore::default());
    let driver = Arc::new(ScriptedPortal::default());
    driver
        .push_lookup(MemberLookup::UseAlternate {
            instruction: "Member must be claimed under MHC Corporate".to_string(),
            context: "corporate".to_string(),
        })
        .await;
    driver.push_lookup(found("M-9", "corporate")).await;

    let visit = enhanced_visit("MHC", Some("S1234567A"));
    let id = visit.id;
    store.insert(visit.clone()).await;

    let stage = stage_with(&store, &driver, draft_policy());
    let outcome = stage.submit(&visit).await.unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.routing_override.as_deref(), Some("corporate"));
    assert_eq!(driver.count("select_context:").await, 1);
    assert_eq!(driver.count("find_member:").await, 2);

    let stored = store.snapshot(id).await;
    let metadata = stored.submission.metadata.unwrap();
    assert_eq!(metadata["routing_override"], serde_json::json!("corporate"));
}

#[tokio::test]
async fn second_reroute_signal_fails_instead_of_looping() {
    let store = Arc::new(MemoryVisitStore::default());
    let driver = Arc::new(ScriptedPortal::default());
    let instruction = "Member must be claimed under MHC Corporate";
    driver
        .push_lookup(MemberLookup::UseAlternate {
            instruction: instruction.to_string(),
            context: "corporate".to_string(),
        })
        .await;
    driver
        .push_lookup(MemberLookup::UseAlternate {
            instruction: "Member must be claimed under MHC Retail".to_string(),
            context: "retail".to_string(),
        })
        .await;

    let visit = enhanced_visit("MHC", Some("S1234567A"));
    store.insert(visit.clone()).await;

    let stage = stage_with(&store, &driver, draft_policy());
    let outcome = stage.submit(&visit).await.unwrap();

    assert!(!outcome.success);
    // Switched once, then refused.
    assert_eq!(driver.count("select_context:").await, 1);
    let error = outcome.error.unwrap();
    assert!(error.contains(instruction));
}

#[tokio::test]
async fn miss_after_reroute_names_the_triggering_instruction() {
    let store = Arc::new(MemoryVisitStore::default());
    let driver = Arc::new(ScriptedPortal::default());
    let instruction = "Member must be claimed under MHC Corporate";
    driver
        .push_lookup(MemberLookup::UseAlternate {
            instruction: instruction.to_string(),
            context: "corporate".to_string(),
        })
        .await;
    driver.push_lookup(MemberLookup::NotFound).await;

    let visit = enhanced_visit("MHC", Some("S1234567A"));
    store.insert(visit.clone()).await;

    let stage = stage_with(&store, &driver, draft_policy());
    let outcome = stage.submit(&visit).await.unwrap();

    assert!(!outcome.success);
    assert!(outcome.error.unwrap().contains(instruction));
    assert_eq!(outcome.routing_override.as_deref(), Some("corporate"));
}

// ============================================================================
// Fill and persistence gate
// ============================================================================

#[tokio::test]
async fn draft_save_is_recorded_on_the_visit() {
    let store = Arc::new(MemoryVisitStore::default());
    let driver = Arc::new(ScriptedPortal::default());
    driver.push_lookup(found("M-1", "default")).await;
    driver
        .set_receipt(SaveReceipt {
            saved: true,
            submitted: false,
            reference: Some("CLM-2024-0042".to_string()),
        })
        .await;

    let visit = enhanced_visit("MHC", Some("S1234567A"));
    let id = visit.id;
    store.insert(visit.clone()).await;

    let stage = stage_with(&store, &driver, draft_policy());
    let outcome = stage.submit(&visit).await.unwrap();

    assert!(outcome.success);
    assert!(outcome.saved_as_draft);
    assert!(!outcome.submitted);

    let stored = store.snapshot(id).await;
    assert_eq!(stored.submission.status, SubmissionStatus::Draft);
    assert_eq!(stored.submission.portal.as_deref(), Some("MHC"));
    assert_eq!(
        stored.submission.metadata.unwrap()["reference"],
        serde_json::json!("CLM-2024-0042")
    );
}

#[tokio::test]
async fn fill_only_run_writes_nothing_even_on_success() {
    let store = Arc::new(MemoryVisitStore::default());
    let driver = Arc::new(ScriptedPortal::default());
    driver.push_lookup(found("M-1", "default")).await;

    let visit = enhanced_visit("MHC", Some("S1234567A"));
    let id = visit.id;
    store.insert(visit.clone()).await;

    let stage = stage_with(&store, &driver, SubmissionPolicy::default());
    let outcome = stage.submit(&visit).await.unwrap();

    assert!(outcome.success);
    assert!(!outcome.saved_as_draft);
    // The form was filled but the save control was never touched.
    assert_eq!(driver.count("fill_visit_date").await, 1);
    assert_eq!(driver.count("save_draft").await, 0);

    let stored = store.snapshot(id).await;
    assert!(!stored.submission.is_set());
    assert!(stored.submission.submitted_at.is_none());
}

#[tokio::test]
async fn fill_only_suppresses_error_writes_unless_opted_in() {
    let store = Arc::new(MemoryVisitStore::default());
    let driver = Arc::new(ScriptedPortal::default());
    driver.push_lookup(MemberLookup::NotFound).await;

    let visit = enhanced_visit("MHC", Some("S1234567A"));
    let id = visit.id;
    store.insert(visit.clone()).await;

    let stage = stage_with(&store, &driver, SubmissionPolicy::default());
    let outcome = stage.submit(&visit).await.unwrap();
    assert!(!outcome.success);
    assert!(!store.snapshot(id).await.submission.is_set());

    // Same failure with the persist-errors flag set is recorded.
    driver.push_lookup(MemberLookup::NotFound).await;
    let stage = stage_with(
        &store,
        &driver,
        SubmissionPolicy {
            persist_errors_in_fill_only: true,
            ..Default::default()
        },
    );
    stage.submit(&visit).await.unwrap();
    let stored = store.snapshot(id).await;
    assert_eq!(stored.submission.status, SubmissionStatus::Error);
}

#[tokio::test]
async fn medicines_are_deduplicated_and_procedures_skipped_when_not_live() {
    let store = Arc::new(MemoryVisitStore::default());
    let driver = Arc::new(ScriptedPortal::default());
    driver.push_lookup(found("M-1", "default")).await;

    let visit = enhanced_visit("MHC", Some("S1234567A"));
    store.insert(visit.clone()).await;

    let stage = stage_with(&store, &driver, draft_policy());
    stage.submit(&visit).await.unwrap();

    let added: Vec<String> = driver
        .calls()
        .await
        .into_iter()
        .filter(|c| c.starts_with("add_medicine:"))
        .collect();
    // Duplicate paracetamol collapsed, dressing kit skipped.
    assert_eq!(added, vec!["add_medicine:Paracetamol 500mg"]);
}

#[tokio::test]
async fn procedure_lines_are_kept_on_live_runs() {
    let store = Arc::new(MemoryVisitStore::default());
    let driver = Arc::new(ScriptedPortal::default());
    driver.push_lookup(found("M-1", "default")).await;
    driver
        .set_receipt(SaveReceipt {
            saved: false,
            submitted: true,
            reference: Some("CLM-2024-0099".to_string()),
        })
        .await;

    let visit = enhanced_visit("MHC", Some("S1234567A"));
    store.insert(visit.clone()).await;

    let policy = SubmissionPolicy {
        save_as_draft: true,
        allow_live_submit: true,
        ..Default::default()
    };
    let stage = stage_with(&store, &driver, policy);
    let outcome = stage.submit(&visit).await.unwrap();

    assert!(outcome.success);
    assert!(outcome.submitted);
    assert_eq!(driver.count("add_medicine:Wound Dressing Kit").await, 1);
}

#[tokio::test]
async fn driver_reported_live_submit_is_blocked_by_policy() {
    let store = Arc::new(MemoryVisitStore::default());
    let driver = Arc::new(ScriptedPortal::default());
    driver.push_lookup(found("M-1", "default")).await;
    driver
        .set_receipt(SaveReceipt {
            saved: false,
            submitted: true,
            reference: Some("CLM-2024-0077".to_string()),
        })
        .await;

    let visit = enhanced_visit("MHC", Some("S1234567A"));
    let id = visit.id;
    store.insert(visit.clone()).await;

    // Draft mode, live submit NOT allowed.
    let stage = stage_with(&store, &driver, draft_policy());
    let outcome = stage.submit(&visit).await.unwrap();

    assert!(!outcome.success);
    assert_eq!(outcome.reason, Some(OutcomeReason::PolicyBlocked));
    assert!(outcome.submitted);
    // A real remote action occurred: always recorded, never hidden.
    let stored = store.snapshot(id).await;
    assert_eq!(stored.submission.status, SubmissionStatus::Error);
    assert!(stored
        .submission
        .error
        .unwrap()
        .contains("blocked by policy"));
}

// ============================================================================
// Batch-fatal conditions
// ============================================================================

#[tokio::test]
async fn lost_session_aborts_the_batch() {
    let store = Arc::new(MemoryVisitStore::default());
    let driver = Arc::new(ScriptedPortal::default());
    driver
        .push_lookup_error(PortError::session_lost("mhc portal"))
        .await;

    let visit = enhanced_visit("MHC", Some("S1234567A"));
    store.insert(visit.clone()).await;

    let stage = stage_with(&store, &driver, draft_policy());
    let result = stage.submit(&visit).await;
    assert!(matches!(result, Err(StageError::Fatal(_))));
}

#[tokio::test]
async fn transient_driver_error_stays_per_visit() {
    let store = Arc::new(MemoryVisitStore::default());
    let driver = Arc::new(ScriptedPortal::default());
    driver
        .push_lookup_error(PortError::connection("member search timed out"))
        .await;

    let visit = enhanced_visit("MHC", Some("S1234567A"));
    store.insert(visit.clone()).await;

    let stage = stage_with(&store, &driver, draft_policy());
    let outcome = stage.submit(&visit).await.unwrap();
    assert!(!outcome.success);
    assert_eq!(outcome.reason, Some(OutcomeReason::AutomationError));
}
