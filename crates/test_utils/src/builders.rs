//! Test Data Builders
//!
//! Provides builder patterns for constructing test data with sensible
//! defaults. Tests specify only the relevant fields.

use chrono::NaiveDate;

use core_kernel::Nric;
use domain_visit::{ChargeType, DetailsStatus, DetailsUpdate, MedicineLine, Visit};

/// Builder for constructing test visits in any lifecycle state
pub struct TestVisitBuilder {
    patient_name: String,
    visit_date: NaiveDate,
    pay_type: String,
    nric: Option<Nric>,
    clinic_record_number: Option<String>,
    details_status: DetailsStatus,
    attempts: u32,
    diagnosis_text: String,
    diagnosis_code: Option<String>,
    charge_type: Option<ChargeType>,
    mc_days: u32,
    medicines: Vec<MedicineLine>,
}

impl Default for TestVisitBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestVisitBuilder {
    /// Creates a builder for a fresh, unenhanced MHC visit
    pub fn new() -> Self {
        Self {
            patient_name: "Tan Ah Kow".to_string(),
            visit_date: NaiveDate::from_ymd_opt(2024, 3, 11).expect("valid date"),
            pay_type: "MHC".to_string(),
            nric: None,
            clinic_record_number: None,
            details_status: DetailsStatus::Unset,
            attempts: 0,
            diagnosis_text: "Acute pharyngitis".to_string(),
            diagnosis_code: Some("J02.9".to_string()),
            charge_type: Some(ChargeType::First),
            mc_days: 1,
            medicines: vec![MedicineLine::new("Paracetamol 500mg", "20")],
        }
    }

    /// Sets the patient name
    pub fn with_patient_name(mut self, name: impl Into<String>) -> Self {
        self.patient_name = name.into();
        self
    }

    /// Sets the visit date
    pub fn with_visit_date(mut self, date: NaiveDate) -> Self {
        self.visit_date = date;
        self
    }

    /// Sets the pay-type tag
    pub fn with_pay_type(mut self, pay_type: impl Into<String>) -> Self {
        self.pay_type = pay_type.into();
        self
    }

    /// Sets the NRIC
    pub fn with_nric(mut self, nric: &str) -> Self {
        self.nric = Some(Nric::parse(nric).expect("valid test nric"));
        self
    }

    /// Sets the clinic record number
    pub fn with_record_number(mut self, number: impl Into<String>) -> Self {
        self.clinic_record_number = Some(number.into());
        self
    }

    /// Sets the diagnosis written on completion
    pub fn with_diagnosis(mut self, text: impl Into<String>) -> Self {
        self.diagnosis_text = text.into();
        self.diagnosis_code = None;
        self
    }

    /// Sets the medicine list written on completion
    pub fn with_medicines(mut self, medicines: Vec<MedicineLine>) -> Self {
        self.medicines = medicines;
        self
    }

    /// Leaves the visit in the given detail status, with failure attempts
    /// already recorded where the status requires them
    pub fn in_details_status(mut self, status: DetailsStatus) -> Self {
        self.details_status = status;
        self
    }

    /// Sets the recorded failure attempt count (implies `Failed` status)
    pub fn with_failed_attempts(mut self, attempts: u32) -> Self {
        self.details_status = DetailsStatus::Failed;
        self.attempts = attempts.max(1);
        self
    }

    /// Builds the visit, replaying state transitions so invariants hold
    pub fn build(self) -> Visit {
        let mut visit = Visit::new(&self.patient_name, self.visit_date, &self.pay_type);
        visit.clinic_record_number = self.clinic_record_number;
        if let Some(nric) = self.nric {
            visit.set_nric(nric);
        }

        match self.details_status {
            DetailsStatus::Unset => {}
            DetailsStatus::InProgress => {
                visit.begin_details_attempt().expect("unset -> in_progress");
            }
            DetailsStatus::Completed => {
                visit.begin_details_attempt().expect("unset -> in_progress");
                visit
                    .complete_details(DetailsUpdate {
                        diagnosis_text: self.diagnosis_text,
                        diagnosis_code: self.diagnosis_code,
                        charge_type: self.charge_type,
                        mc_days: self.mc_days,
                        mc_start_date: None,
                        medicines: self.medicines,
                        treatment_summary: None,
                        sources: serde_json::json!({"source_method": "record_number"}),
                    })
                    .expect("in_progress -> completed");
            }
            DetailsStatus::Failed => {
                for attempt in 0..self.attempts.max(1) {
                    visit
                        .begin_details_attempt()
                        .expect("retryable -> in_progress");
                    visit
                        .fail_details(format!("scripted failure #{}", attempt + 1))
                        .expect("in_progress -> failed");
                }
            }
        }
        visit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completed_visit_has_clinical_fields() {
        let visit = TestVisitBuilder::new()
            .with_nric("S1234567A")
            .in_details_status(DetailsStatus::Completed)
            .build();
        assert_eq!(visit.details.status, DetailsStatus::Completed);
        assert!(visit.diagnosis_text.is_some());
        assert!(!visit.medicines.is_empty());
    }

    #[test]
    fn test_failed_visit_carries_attempt_count() {
        let visit = TestVisitBuilder::new().with_failed_attempts(3).build();
        assert_eq!(visit.details.status, DetailsStatus::Failed);
        assert_eq!(visit.details.attempts, 3);
    }
}
