//! Pre-submission validation gate
//!
//! A read-only batch scan over a date range of visits, run independently as
//! a quality gate before any submission batch. It flags incomplete
//! enhancement, missing identifiers, empty medicine lists, and diagnoses
//! that look like the extractor grabbed a procedure or device description
//! instead of an actual diagnosis. It fixes nothing.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use core_kernel::{PortError, VisitId};

use crate::ports::{VisitQuery, VisitStore};
use crate::visit::{DetailsStatus, Visit, MISSING_DIAGNOSIS};

/// Terms that usually mean the diagnosis field holds a procedure or device
/// description rather than a diagnosis
pub const SUSPICIOUS_DIAGNOSIS_TERMS: &[&str] = &[
    "brace",
    "fitting",
    "splint",
    "strap",
    "crutch",
    "insole",
    "cast",
    "bandage",
    "stocking",
    "guard",
];

/// Per-visit gate result
#[derive(Debug, Clone, Serialize)]
pub struct GateCheck {
    pub visit_id: VisitId,
    pub patient_name: String,
    pub nric_present: bool,
    pub details_completed: bool,
    pub diagnosis_present: bool,
    /// The matched suspicious term, if any
    pub suspicious_term: Option<String>,
    pub has_medicines: bool,
}

impl GateCheck {
    /// True when nothing about this visit needs attention
    pub fn passed(&self) -> bool {
        self.nric_present
            && self.details_completed
            && self.diagnosis_present
            && self.suspicious_term.is_none()
            && self.has_medicines
    }
}

/// Aggregated gate outcome
#[derive(Debug, Default, Serialize)]
pub struct GateReport {
    pub scanned: u32,
    pub passed: u32,
    pub missing_nric: u32,
    pub not_completed: u32,
    pub missing_diagnosis: u32,
    pub suspicious_diagnosis: u32,
    pub empty_medicines: u32,
    /// Failing visits only
    pub findings: Vec<GateCheck>,
}

impl GateReport {
    /// The gate is a hard failure if any visit in range is not completed or
    /// carries a suspicious diagnosis
    pub fn hard_failure(&self) -> bool {
        self.not_completed > 0 || self.suspicious_diagnosis > 0
    }
}

/// Evaluates one visit against the gate criteria. Pure and testable.
pub fn check_visit(visit: &Visit) -> GateCheck {
    let diagnosis = visit
        .diagnosis_text
        .as_deref()
        .filter(|t| !t.trim().is_empty() && *t != MISSING_DIAGNOSIS);

    let suspicious_term = diagnosis.and_then(|text| {
        let lowered = text.to_lowercase();
        SUSPICIOUS_DIAGNOSIS_TERMS
            .iter()
            .find(|term| lowered.contains(*term))
            .map(|term| term.to_string())
    });

    GateCheck {
        visit_id: visit.id,
        patient_name: visit.patient_name.clone(),
        nric_present: visit.nric.is_some(),
        details_completed: visit.details.status == DetailsStatus::Completed,
        diagnosis_present: diagnosis.is_some(),
        suspicious_term,
        has_medicines: !visit.medicines.is_empty(),
    }
}

/// Read-only batch consistency checker
pub struct ValidationGate {
    store: Arc<dyn VisitStore>,
}

impl ValidationGate {
    pub fn new(store: Arc<dyn VisitStore>) -> Self {
        Self { store }
    }

    /// Scans all visits matching the query and aggregates the outcome
    pub async fn scan(&self, query: &VisitQuery) -> Result<GateReport, PortError> {
        let visits = self.store.find(query).await?;

        let mut report = GateReport::default();
        for visit in &visits {
            let check = check_visit(visit);
            report.scanned += 1;

            if !check.nric_present {
                report.missing_nric += 1;
            }
            if !check.details_completed {
                report.not_completed += 1;
            }
            if !check.diagnosis_present {
                report.missing_diagnosis += 1;
            }
            if check.suspicious_term.is_some() {
                report.suspicious_diagnosis += 1;
            }
            if !check.has_medicines {
                report.empty_medicines += 1;
            }

            if check.passed() {
                report.passed += 1;
            } else {
                report.findings.push(check);
            }
        }

        info!(
            scanned = report.scanned,
            passed = report.passed,
            hard_failure = report.hard_failure(),
            "validation gate scan complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visit::{ChargeType, DetailsUpdate, MedicineLine};
    use chrono::NaiveDate;

    fn completed_visit(diagnosis: &str) -> Visit {
        let mut visit = Visit::new(
            "Lim Bee Hoon",
            NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
            "MHC",
        );
        visit.set_nric(core_kernel::Nric::parse("S1234567A").unwrap());
        visit.begin_details_attempt().unwrap();
        visit
            .complete_details(DetailsUpdate {
                diagnosis_text: diagnosis.to_string(),
                diagnosis_code: None,
                charge_type: Some(ChargeType::Follow),
                mc_days: 0,
                mc_start_date: None,
                medicines: vec![MedicineLine::new("Loratadine 10mg", "10")],
                treatment_summary: None,
                sources: serde_json::Value::Null,
            })
            .unwrap();
        visit
    }

    #[test]
    fn test_clean_visit_passes() {
        let check = check_visit(&completed_visit("Allergic rhinitis"));
        assert!(check.passed());
        assert!(check.suspicious_term.is_none());
    }

    #[test]
    fn test_procedure_description_is_suspicious() {
        let check = check_visit(&completed_visit("Knee Brace Fitting"));
        assert!(!check.passed());
        assert_eq!(check.suspicious_term.as_deref(), Some("brace"));
    }

    #[test]
    fn test_sentinel_diagnosis_counts_as_missing() {
        let check = check_visit(&completed_visit(MISSING_DIAGNOSIS));
        assert!(!check.diagnosis_present);
        assert!(!check.passed());
    }

    #[test]
    fn test_unenhanced_visit_fails_completion_check() {
        let visit = Visit::new(
            "Ong Teck Seng",
            NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
            "MHC",
        );
        let check = check_visit(&visit);
        assert!(!check.details_completed);
        assert!(!check.nric_present);
    }
}
