//! Clinic-system driver over the automation bridge
//!
//! Implements the source driver port by issuing bridge commands against the
//! clinic management web application.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use core_kernel::{DomainPort, Nric, PortError};
use domain_visit::{
    ChargeType, MedicineLine, PatientHandle, PatientMatch, SourceDriver, VisitDetailsData,
};

use crate::client::BridgeClient;

/// Source driver backed by the bridge sidecar
#[derive(Debug, Clone)]
pub struct ClinicBridge {
    client: BridgeClient,
}

impl ClinicBridge {
    pub fn new(client: BridgeClient) -> Self {
        Self { client }
    }
}

#[derive(Serialize)]
struct PatientSearchRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    record_number: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Deserialize)]
struct PatientSearchResponse {
    patient: Option<PatientDto>,
}

#[derive(Deserialize)]
struct PatientDto {
    patient_id: String,
    nric: Option<String>,
    matched_by: String,
}

impl PatientDto {
    fn into_handle(self) -> Result<PatientHandle, PortError> {
        let matched_by = match self.matched_by.as_str() {
            "record_number" => PatientMatch::RecordNumber,
            "name_search" => PatientMatch::NameSearch,
            other => {
                return Err(PortError::internal(format!(
                    "unknown match method '{other}' from bridge"
                )))
            }
        };
        // A malformed NRIC on the profile page is dropped rather than
        // failing the whole lookup; the submission stage re-checks.
        let nric = self.nric.as_deref().and_then(|n| Nric::parse(n).ok());
        Ok(PatientHandle {
            patient_id: self.patient_id,
            nric,
            matched_by,
        })
    }
}

#[derive(Serialize)]
struct VisitDetailsRequest<'a> {
    patient_id: &'a str,
    visit_date: NaiveDate,
}

#[derive(Deserialize)]
struct VisitDetailsResponse {
    charge_type: Option<String>,
    diagnosis_text: Option<String>,
    diagnosis_code: Option<String>,
    mc_days: Option<u32>,
    mc_start_date: Option<NaiveDate>,
    #[serde(default)]
    medicines: Vec<MedicineDto>,
    treatment_summary: Option<String>,
}

#[derive(Deserialize)]
struct MedicineDto {
    name: String,
    #[serde(default)]
    quantity: String,
}

impl VisitDetailsResponse {
    fn into_data(self) -> VisitDetailsData {
        let charge_type = match self.charge_type.as_deref() {
            Some("first") => Some(ChargeType::First),
            Some("follow") => Some(ChargeType::Follow),
            _ => None,
        };
        VisitDetailsData {
            charge_type,
            diagnosis_text: self.diagnosis_text,
            diagnosis_code: self.diagnosis_code,
            mc_days: self.mc_days,
            mc_start_date: self.mc_start_date,
            medicines: self
                .medicines
                .into_iter()
                .map(|m| MedicineLine::new(m.name, m.quantity))
                .collect(),
            treatment_summary: self.treatment_summary,
        }
    }
}

#[derive(Deserialize)]
struct Ack {
    #[allow(dead_code)]
    ok: bool,
}

impl DomainPort for ClinicBridge {}

#[async_trait]
impl SourceDriver for ClinicBridge {
    async fn authenticate(&self) -> Result<(), PortError> {
        let _: Ack = self
            .client
            .post("/clinic/session", &serde_json::json!({}))
            .await?;
        Ok(())
    }

    async fn find_by_record_number(
        &self,
        record_number: &str,
    ) -> Result<Option<PatientHandle>, PortError> {
        let response: PatientSearchResponse = self
            .client
            .post(
                "/clinic/patients/search",
                &PatientSearchRequest {
                    record_number: Some(record_number),
                    name: None,
                },
            )
            .await?;
        response.patient.map(PatientDto::into_handle).transpose()
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<PatientHandle>, PortError> {
        let response: PatientSearchResponse = self
            .client
            .post(
                "/clinic/patients/search",
                &PatientSearchRequest {
                    record_number: None,
                    name: Some(name),
                },
            )
            .await?;
        response.patient.map(PatientDto::into_handle).transpose()
    }

    async fn fetch_visit_details(
        &self,
        patient: &PatientHandle,
        date: NaiveDate,
    ) -> Result<VisitDetailsData, PortError> {
        let response: VisitDetailsResponse = self
            .client
            .post(
                "/clinic/visit-details",
                &VisitDetailsRequest {
                    patient_id: &patient.patient_id,
                    visit_date: date,
                },
            )
            .await?;
        Ok(response.into_data())
    }

    async fn end_session(&self) -> Result<(), PortError> {
        let _: Ack = self
            .client
            .post("/clinic/session/end", &serde_json::json!({}))
            .await?;
        Ok(())
    }
}
