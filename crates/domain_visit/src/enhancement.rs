//! Enhancement stage
//!
//! Drives the clinic-system automation driver to populate a visit's clinical
//! fields, advancing the detail state machine as it goes. Every failure here
//! is per-visit and retryable; only a dead session or an unreachable store
//! aborts the batch.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use core_kernel::PortError;
use domain_batch::{RunType, StageError, StageOutcome, StageProcessor, StageState, StageStatus};

use crate::medicines::filter_dispensed;
use crate::ports::{PatientHandle, SourceDriver, VisitStore};
use crate::visit::{DetailsStatus, DetailsUpdate, Visit, MISSING_DIAGNOSIS};

/// Populates clinical fields by scraping the clinic system
pub struct EnhancementStage {
    store: Arc<dyn VisitStore>,
    driver: Arc<dyn SourceDriver>,
}

impl EnhancementStage {
    pub fn new(store: Arc<dyn VisitStore>, driver: Arc<dyn SourceDriver>) -> Self {
        Self { store, driver }
    }

    /// Record-number lookup first; name search only as a fallback because
    /// names are ambiguous and subject to formatting drift.
    async fn locate_patient(&self, visit: &Visit) -> Result<Option<PatientHandle>, PortError> {
        if let Some(record_number) = &visit.clinic_record_number {
            if let Some(handle) = self.driver.find_by_record_number(record_number).await? {
                return Ok(Some(handle));
            }
            debug!(
                visit_id = %visit.id,
                record_number,
                "record-number lookup missed, falling back to name search"
            );
        }

        self.driver.find_by_name(&visit.patient_name).await
    }

    async fn enhance(&self, visit: &Visit) -> Result<StageOutcome, StageError> {
        // Persisted before any driver interaction so a later failure is
        // attributable to this attempt.
        self.store
            .begin_details_attempt(visit.id)
            .await
            .map_err(store_error)?;

        let handle = match self.locate_patient(visit).await {
            Ok(Some(handle)) => handle,
            Ok(None) => {
                let message = format!("patient '{}' not found in clinic system", visit.patient_name);
                self.store
                    .fail_details(visit.id, &message)
                    .await
                    .map_err(store_error)?;
                return Ok(StageOutcome::Failed { error: message });
            }
            Err(error) => return self.fail_attempt(visit, error).await,
        };

        // Persist the identifier the moment it is discovered; this partial
        // progress must survive a failure in any later step.
        if visit.nric.is_none() {
            if let Some(nric) = &handle.nric {
                info!(visit_id = %visit.id, %nric, "persisting discovered NRIC");
                self.store
                    .set_nric(visit.id, nric)
                    .await
                    .map_err(store_error)?;
            }
        }

        let details = match self
            .driver
            .fetch_visit_details(&handle, visit.visit_date)
            .await
        {
            Ok(details) => details,
            Err(error) => return self.fail_attempt(visit, error).await,
        };

        let mut missing: Vec<&str> = Vec::new();
        let diagnosis_text = match details.diagnosis_text.filter(|t| !t.trim().is_empty()) {
            Some(text) => text,
            None => {
                missing.push("diagnosis");
                MISSING_DIAGNOSIS.to_string()
            }
        };
        if details.charge_type.is_none() {
            missing.push("charge_type");
        }

        let medicines = filter_dispensed(details.medicines);
        if medicines.is_empty() {
            missing.push("medicines");
        }

        let update = DetailsUpdate {
            diagnosis_text,
            diagnosis_code: details.diagnosis_code,
            charge_type: details.charge_type,
            // Always explicit, zero included: "seen, no MC" is a fact worth
            // recording, not an absence.
            mc_days: details.mc_days.unwrap_or(0),
            mc_start_date: details.mc_start_date,
            medicines,
            treatment_summary: details.treatment_summary,
            sources: serde_json::json!({
                "source_method": handle.matched_by.as_str(),
                "patient_id": handle.patient_id,
                "missing": missing,
            }),
        };

        self.store
            .complete_details(visit.id, update)
            .await
            .map_err(store_error)?;

        info!(visit_id = %visit.id, "enhancement completed");
        Ok(StageOutcome::Completed)
    }

    /// Records a driver failure against the visit and keeps the batch alive,
    /// unless the session itself is gone.
    async fn fail_attempt(
        &self,
        visit: &Visit,
        error: PortError,
    ) -> Result<StageOutcome, StageError> {
        if error.is_batch_fatal() {
            return Err(StageError::Fatal(error));
        }

        let message = error.to_string();
        warn!(visit_id = %visit.id, %message, "enhancement attempt failed");
        self.store
            .fail_details(visit.id, &message)
            .await
            .map_err(store_error)?;
        Ok(StageOutcome::Failed { error: message })
    }
}

/// Store failures abort the batch when the store looks unreachable;
/// row-level problems stay per-visit.
fn store_error(error: PortError) -> StageError {
    if error.is_transient() {
        StageError::Fatal(error)
    } else {
        StageError::Item(error)
    }
}

#[async_trait]
impl StageProcessor<Visit> for EnhancementStage {
    fn run_type(&self) -> RunType {
        RunType::Enhancement
    }

    fn item_id(&self, visit: &Visit) -> String {
        visit.id.to_string()
    }

    fn stage_state(&self, visit: &Visit) -> StageState {
        let status = match visit.details.status {
            DetailsStatus::Unset => StageStatus::Unset,
            DetailsStatus::InProgress => StageStatus::InProgress,
            DetailsStatus::Completed => StageStatus::Completed,
            DetailsStatus::Failed => StageStatus::Failed,
        };
        StageState::new(status, visit.details.attempts)
    }

    async fn prepare(&self) -> Result<(), StageError> {
        self.driver
            .authenticate()
            .await
            .map_err(StageError::Fatal)
    }

    async fn process(&self, visit: &Visit) -> Result<StageOutcome, StageError> {
        self.enhance(visit).await
    }

    async fn finish(&self) {
        if let Err(error) = self.driver.end_session().await {
            warn!(%error, "failed to close clinic session");
        }
    }
}
