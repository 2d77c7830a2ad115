//! Visit aggregate

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{Nric, VisitId};

use crate::error::VisitError;

/// Sentinel written when enhancement ran but the source system had no
/// diagnosis for the visit. Distinguishes "attempted, found nothing" from
/// "not yet attempted" (which is `None`).
pub const MISSING_DIAGNOSIS: &str = "NO DIAGNOSIS FOUND";

/// First consultation vs follow-up
///
/// The distinction matters downstream: each maps to a different form control
/// on the claim portals, not merely a different label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeType {
    First,
    Follow,
}

impl ChargeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChargeType::First => "first",
            ChargeType::Follow => "follow",
        }
    }
}

/// Enhancement status of a visit's clinical details
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailsStatus {
    Unset,
    InProgress,
    Completed,
    Failed,
}

impl DetailsStatus {
    /// Checks if transition is valid
    ///
    /// Every status may re-enter `InProgress`: retries from `Failed`,
    /// forced reprocessing of `Completed` rows, and recovery of rows a
    /// dead process left `InProgress`. Whether a re-begin is wanted is the
    /// batch policy's decision, not the state machine's.
    pub fn can_transition_to(&self, target: DetailsStatus) -> bool {
        use DetailsStatus::*;
        matches!(
            (self, target),
            (_, InProgress) | (InProgress, Completed) | (InProgress, Failed)
        )
    }
}

/// Submission status of a visit's claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Unset,
    Draft,
    Submitted,
    Error,
}

/// One dispensed medicine line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicineLine {
    pub name: String,
    pub quantity: String,
}

impl MedicineLine {
    pub fn new(name: impl Into<String>, quantity: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            quantity: quantity.into(),
        }
    }
}

/// Enhancement status block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailsBlock {
    /// Current state in the enhancement machine
    pub status: DetailsStatus,
    /// Incremented only on failure
    pub attempts: u32,
    /// Timestamp of the most recent attempt
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Error from the most recent failed attempt
    pub error: Option<String>,
    /// Free-form diagnostic metadata: source method, missing-data reasons
    pub sources: serde_json::Value,
}

impl Default for DetailsBlock {
    fn default() -> Self {
        Self {
            status: DetailsStatus::Unset,
            attempts: 0,
            last_attempt_at: None,
            error: None,
            sources: serde_json::Value::Null,
        }
    }
}

/// Submission status block
///
/// Set only when a persistence-worthy action occurred: a draft save, a
/// policy-allowed live submit, or an error the policy allows recording.
/// A fill-only run leaves this block completely untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmissionBlock {
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(default = "SubmissionBlock::default_status")]
    pub status: SubmissionStatus,
    pub portal: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl SubmissionBlock {
    fn default_status() -> SubmissionStatus {
        SubmissionStatus::Unset
    }

    /// True if any persistence-worthy action has been recorded
    pub fn is_set(&self) -> bool {
        !matches!(self.status, SubmissionStatus::Unset)
    }
}

impl Default for SubmissionStatus {
    fn default() -> Self {
        SubmissionStatus::Unset
    }
}

/// Fields written together when an enhancement attempt completes
#[derive(Debug, Clone)]
pub struct DetailsUpdate {
    pub diagnosis_text: String,
    pub diagnosis_code: Option<String>,
    pub charge_type: Option<ChargeType>,
    pub mc_days: u32,
    pub mc_start_date: Option<NaiveDate>,
    pub medicines: Vec<MedicineLine>,
    pub treatment_summary: Option<String>,
    pub sources: serde_json::Value,
}

/// One clinic encounter for one patient
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Visit {
    /// Unique identifier
    pub id: VisitId,
    /// Patient name as recorded in the clinic queue
    pub patient_name: String,
    /// Date of the encounter
    pub visit_date: NaiveDate,
    /// Free-text tag identifying the paying organization/portal
    pub pay_type: String,
    /// National identifier, mandatory for Group-A portals
    pub nric: Option<Nric>,
    /// Stable numeric identifier in the clinic system, preferred over
    /// name-based search
    pub clinic_record_number: Option<String>,
    /// Diagnosis free text
    pub diagnosis_text: Option<String>,
    /// Structured diagnosis code, when the source system has one
    pub diagnosis_code: Option<String>,
    /// First consult vs follow-up
    pub charge_type: Option<ChargeType>,
    /// Medical certificate days (zero is meaningful: "seen, no MC")
    pub mc_days: Option<u32>,
    /// Medical certificate start date
    pub mc_start_date: Option<NaiveDate>,
    /// Dispensed medicines, already filtered of junk lines
    pub medicines: Vec<MedicineLine>,
    /// Treatment summary text
    pub treatment_summary: Option<String>,
    /// Enhancement status block
    pub details: DetailsBlock,
    /// Submission status block
    pub submission: SubmissionBlock,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl Visit {
    /// Creates a fresh queue record, before any enhancement
    pub fn new(
        patient_name: impl Into<String>,
        visit_date: NaiveDate,
        pay_type: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: VisitId::new_v7(),
            patient_name: patient_name.into(),
            visit_date,
            pay_type: pay_type.into(),
            nric: None,
            clinic_record_number: None,
            diagnosis_text: None,
            diagnosis_code: None,
            charge_type: None,
            mc_days: None,
            mc_start_date: None,
            medicines: Vec::new(),
            treatment_summary: None,
            details: DetailsBlock::default(),
            submission: SubmissionBlock::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Moves the detail machine to `InProgress`
    ///
    /// Persisted before any external interaction so a later failure is
    /// visibly attributable to a specific attempt.
    pub fn begin_details_attempt(&mut self) -> Result<(), VisitError> {
        if !self.details.status.can_transition_to(DetailsStatus::InProgress) {
            return Err(VisitError::InvalidStatusTransition {
                from: format!("{:?}", self.details.status),
                to: "InProgress".to_string(),
            });
        }
        self.details.status = DetailsStatus::InProgress;
        self.details.last_attempt_at = Some(Utc::now());
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Applies a completed enhancement in one logical update
    pub fn complete_details(&mut self, update: DetailsUpdate) -> Result<(), VisitError> {
        if !self.details.status.can_transition_to(DetailsStatus::Completed) {
            return Err(VisitError::InvalidStatusTransition {
                from: format!("{:?}", self.details.status),
                to: "Completed".to_string(),
            });
        }
        self.diagnosis_text = Some(update.diagnosis_text);
        self.diagnosis_code = update.diagnosis_code;
        self.charge_type = update.charge_type;
        self.mc_days = Some(update.mc_days);
        self.mc_start_date = update.mc_start_date;
        self.medicines = update.medicines;
        self.treatment_summary = update.treatment_summary;
        self.details.sources = update.sources;
        self.details.status = DetailsStatus::Completed;
        self.details.error = None;
        self.details.last_attempt_at = Some(Utc::now());
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Records a failed enhancement attempt
    pub fn fail_details(&mut self, error: impl Into<String>) -> Result<(), VisitError> {
        if !self.details.status.can_transition_to(DetailsStatus::Failed) {
            return Err(VisitError::InvalidStatusTransition {
                from: format!("{:?}", self.details.status),
                to: "Failed".to_string(),
            });
        }
        self.details.status = DetailsStatus::Failed;
        self.details.attempts += 1;
        self.details.error = Some(error.into());
        self.details.last_attempt_at = Some(Utc::now());
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Records the discovered NRIC, independently of overall enhancement
    /// success
    pub fn set_nric(&mut self, nric: Nric) {
        self.nric = Some(nric);
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn test_visit() -> Visit {
        Visit::new("Tan Ah Kow", NaiveDate::from_ymd_opt(2024, 3, 11).unwrap(), "MHC")
    }

    fn completed_update() -> DetailsUpdate {
        DetailsUpdate {
            diagnosis_text: "Acute pharyngitis".to_string(),
            diagnosis_code: Some("J02.9".to_string()),
            charge_type: Some(ChargeType::First),
            mc_days: 2,
            mc_start_date: NaiveDate::from_ymd_opt(2024, 3, 11),
            medicines: vec![MedicineLine::new("Paracetamol 500mg", "20")],
            treatment_summary: None,
            sources: serde_json::json!({"source_method": "record_number"}),
        }
    }

    #[test]
    fn test_new_visit_is_unset() {
        let visit = test_visit();
        assert_eq!(visit.details.status, DetailsStatus::Unset);
        assert_eq!(visit.details.attempts, 0);
        assert!(!visit.submission.is_set());
    }

    #[test]
    fn test_enhancement_happy_path() {
        let mut visit = test_visit();
        visit.begin_details_attempt().unwrap();
        assert_eq!(visit.details.status, DetailsStatus::InProgress);

        visit.complete_details(completed_update()).unwrap();
        assert_eq!(visit.details.status, DetailsStatus::Completed);
        assert_eq!(visit.diagnosis_code.as_deref(), Some("J02.9"));
        assert_eq!(visit.mc_days, Some(2));
        assert!(visit.details.error.is_none());
    }

    #[test]
    fn test_failure_increments_attempts() {
        let mut visit = test_visit();
        visit.begin_details_attempt().unwrap();
        visit.fail_details("patient not found").unwrap();
        assert_eq!(visit.details.status, DetailsStatus::Failed);
        assert_eq!(visit.details.attempts, 1);

        // Failed -> InProgress is allowed on retry.
        visit.begin_details_attempt().unwrap();
        visit.fail_details("still not found").unwrap();
        assert_eq!(visit.details.attempts, 2);
    }

    #[test]
    fn test_cannot_complete_without_attempt() {
        let mut visit = test_visit();
        assert!(visit.complete_details(completed_update()).is_err());
    }

    #[test]
    fn test_completed_visit_can_begin_a_forced_reprocess() {
        let mut visit = test_visit();
        visit.begin_details_attempt().unwrap();
        visit.complete_details(completed_update()).unwrap();

        visit.begin_details_attempt().unwrap();
        assert_eq!(visit.details.status, DetailsStatus::InProgress);
        visit.complete_details(completed_update()).unwrap();
        assert_eq!(visit.details.status, DetailsStatus::Completed);
    }

    #[test]
    fn test_in_progress_visit_can_begin_again() {
        // A process that died mid-attempt leaves the row InProgress; the
        // next run must be able to pick it back up.
        let mut visit = test_visit();
        visit.begin_details_attempt().unwrap();
        visit.begin_details_attempt().unwrap();
        assert_eq!(visit.details.status, DetailsStatus::InProgress);
    }

    #[test]
    fn test_cannot_fail_without_attempt() {
        let mut visit = test_visit();
        assert!(visit.fail_details("no attempt underway").is_err());
    }
}
