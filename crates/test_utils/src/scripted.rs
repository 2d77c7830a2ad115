//! Scripted automation drivers
//!
//! Programmable doubles for the clinic and portal drivers. Each records
//! every call it receives so tests can assert on interaction order and
//! count, and each can be scripted to fail, re-route, or report a live
//! submission.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use core_kernel::{DomainPort, Nric, PortError};
use domain_claims::{MemberHandle, MemberLookup, PortalDriver, SaveReceipt};
use domain_visit::{
    ChargeType, MedicineLine, PatientHandle, PatientMatch, SourceDriver, VisitDetailsData,
};

type ErrorScript = Box<dyn Fn() -> PortError + Send + Sync>;

/// Scripted clinic-system driver
#[derive(Default)]
pub struct ScriptedClinicDriver {
    by_record_number: Mutex<HashMap<String, PatientHandle>>,
    by_name: Mutex<HashMap<String, PatientHandle>>,
    details: Mutex<HashMap<String, VisitDetailsData>>,
    fetch_error: Mutex<Option<ErrorScript>>,
    auth_error: Mutex<Option<ErrorScript>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedClinicDriver {
    /// Registers a patient findable by record number
    pub async fn patient_by_record_number(
        &self,
        record_number: &str,
        patient_id: &str,
        nric: Option<&str>,
    ) {
        self.by_record_number.lock().await.insert(
            record_number.to_string(),
            handle(patient_id, nric, PatientMatch::RecordNumber),
        );
    }

    /// Registers a patient findable by name search
    pub async fn patient_by_name(&self, name: &str, patient_id: &str, nric: Option<&str>) {
        self.by_name.lock().await.insert(
            name.to_string(),
            handle(patient_id, nric, PatientMatch::NameSearch),
        );
    }

    /// Scripts the details returned for a patient id
    pub async fn details_for(&self, patient_id: &str, details: VisitDetailsData) {
        self.details
            .lock()
            .await
            .insert(patient_id.to_string(), details);
    }

    /// Makes every details fetch fail with the scripted error
    pub async fn fail_fetch_with(&self, make: impl Fn() -> PortError + Send + Sync + 'static) {
        *self.fetch_error.lock().await = Some(Box::new(make));
    }

    /// Makes authentication fail
    pub async fn fail_auth_with(&self, make: impl Fn() -> PortError + Send + Sync + 'static) {
        *self.auth_error.lock().await = Some(Box::new(make));
    }

    /// All recorded calls in order
    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }

    /// Number of recorded calls starting with the prefix
    pub async fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    async fn record(&self, call: impl Into<String>) {
        self.calls.lock().await.push(call.into());
    }
}

fn handle(patient_id: &str, nric: Option<&str>, matched_by: PatientMatch) -> PatientHandle {
    PatientHandle {
        patient_id: patient_id.to_string(),
        nric: nric.and_then(|n| Nric::parse(n).ok()),
        matched_by,
    }
}

impl DomainPort for ScriptedClinicDriver {}

#[async_trait]
impl SourceDriver for ScriptedClinicDriver {
    async fn authenticate(&self) -> Result<(), PortError> {
        self.record("authenticate").await;
        if let Some(make) = self.auth_error.lock().await.as_ref() {
            return Err(make());
        }
        Ok(())
    }

    async fn find_by_record_number(
        &self,
        record_number: &str,
    ) -> Result<Option<PatientHandle>, PortError> {
        self.record(format!("find_by_record_number:{record_number}"))
            .await;
        Ok(self.by_record_number.lock().await.get(record_number).cloned())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<PatientHandle>, PortError> {
        self.record(format!("find_by_name:{name}")).await;
        Ok(self.by_name.lock().await.get(name).cloned())
    }

    async fn fetch_visit_details(
        &self,
        patient: &PatientHandle,
        date: NaiveDate,
    ) -> Result<VisitDetailsData, PortError> {
        self.record(format!("fetch_visit_details:{}:{date}", patient.patient_id))
            .await;
        if let Some(make) = self.fetch_error.lock().await.as_ref() {
            return Err(make());
        }
        Ok(self
            .details
            .lock()
            .await
            .get(&patient.patient_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn end_session(&self) -> Result<(), PortError> {
        self.record("end_session").await;
        Ok(())
    }
}

/// Scripted claim-portal driver
#[derive(Default)]
pub struct ScriptedPortalDriver {
    lookups: Mutex<VecDeque<Result<MemberLookup, PortError>>>,
    receipt: Mutex<Option<SaveReceipt>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedPortalDriver {
    /// Queues a response for the next `find_member` call
    pub async fn push_lookup(&self, lookup: MemberLookup) {
        self.lookups.lock().await.push_back(Ok(lookup));
    }

    /// Queues a member found in the given context
    pub async fn push_found(&self, member_id: &str, context: &str) {
        self.push_lookup(MemberLookup::Found(MemberHandle {
            member_id: member_id.to_string(),
            context: context.to_string(),
        }))
        .await;
    }

    /// Queues an error for the next `find_member` call
    pub async fn push_lookup_error(&self, error: PortError) {
        self.lookups.lock().await.push_back(Err(error));
    }

    /// Scripts the receipt returned by `save_draft`
    pub async fn set_receipt(&self, receipt: SaveReceipt) {
        *self.receipt.lock().await = Some(receipt);
    }

    /// All recorded calls in order
    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }

    /// Number of recorded calls starting with the prefix
    pub async fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    async fn record(&self, call: impl Into<String>) {
        self.calls.lock().await.push(call.into());
    }
}

impl DomainPort for ScriptedPortalDriver {}

#[async_trait]
impl PortalDriver for ScriptedPortalDriver {
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
            .unwrap_or(Ok(MemberLookup::NotFound))
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
        self.record(format!("select_diagnosis:{}:{text}", code.unwrap_or("-")))
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
