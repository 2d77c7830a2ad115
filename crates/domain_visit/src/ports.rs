//! Visit Domain Ports
//!
//! Two ports are defined here: the record store for visit rows, and the
//! automation driver for the clinic management system (the source of
//! clinical details). Adapters implement these traits:
//!
//! - **infra_db**: PostgreSQL visit repository
//! - **infra_bridge**: HTTP client to the out-of-process automation bridge
//! - **test_utils**: in-memory store and scripted driver
//!
//! The engine never depends on DOM/selector strategy; everything the clinic
//! website does is behind [`SourceDriver`]'s typed capability methods.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{DomainPort, Nric, PortError, VisitId};

use crate::visit::{ChargeType, DetailsStatus, DetailsUpdate, MedicineLine, Visit};

/// Query parameters for selecting candidate visits
#[derive(Debug, Clone, Default)]
pub struct VisitQuery {
    /// Restrict to explicit visit ids
    pub ids: Vec<VisitId>,
    /// Case-insensitive substring patterns matched against `pay_type`
    /// (source tagging is inconsistent, so exact equality is useless)
    pub pay_type_patterns: Vec<String>,
    /// Inclusive start of the visit-date range
    pub date_from: Option<NaiveDate>,
    /// Inclusive end of the visit-date range
    pub date_to: Option<NaiveDate>,
    /// Restrict to a details status
    pub details_status: Option<DetailsStatus>,
    /// Limit results
    pub limit: Option<u32>,
}

impl VisitQuery {
    /// Creates a query for explicit ids
    pub fn by_ids(ids: Vec<VisitId>) -> Self {
        Self {
            ids,
            ..Default::default()
        }
    }

    /// Creates a query for an inclusive date range
    pub fn by_date_range(from: NaiveDate, to: NaiveDate) -> Self {
        Self {
            date_from: Some(from),
            date_to: Some(to),
            ..Default::default()
        }
    }

    /// Adds a pay-type substring pattern
    pub fn with_pay_type(mut self, pattern: impl Into<String>) -> Self {
        self.pay_type_patterns.push(pattern.into());
        self
    }

    /// True when the query constrains nothing — the caller must opt in
    /// explicitly before running an unscoped full-table batch
    pub fn is_unscoped(&self) -> bool {
        self.ids.is_empty()
            && self.pay_type_patterns.is_empty()
            && self.date_from.is_none()
            && self.date_to.is_none()
            && self.details_status.is_none()
    }
}

/// Submission result persisted against a visit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionRecord {
    /// Portal the claim was filed with
    pub portal: String,
    /// True when the claim was left as a portal draft
    pub saved_as_draft: bool,
    /// True when a live submission occurred (policy-gated)
    pub submitted: bool,
    /// Result payload from the portal (reference numbers, context switches)
    pub metadata: serde_json::Value,
    /// When the persistence action happened
    pub at: DateTime<Utc>,
}

/// Persistence port for visit rows
///
/// Updates are single-writer last-write-wins per visit id; no lock is held
/// across an external-system round trip.
#[async_trait]
pub trait VisitStore: DomainPort {
    /// Fetches a visit by id
    async fn get(&self, id: VisitId) -> Result<Visit, PortError>;

    /// Finds visits matching the query, most recent visit date first
    async fn find(&self, query: &VisitQuery) -> Result<Vec<Visit>, PortError>;

    /// Records a discovered NRIC immediately, independent of the enhancement
    /// attempt's overall outcome
    async fn set_nric(&self, id: VisitId, nric: &Nric) -> Result<(), PortError>;

    /// Moves the detail machine to `InProgress`, persisted before any
    /// driver interaction
    async fn begin_details_attempt(&self, id: VisitId) -> Result<(), PortError>;

    /// Applies a completed enhancement in one logical update
    async fn complete_details(&self, id: VisitId, update: DetailsUpdate) -> Result<(), PortError>;

    /// Records a failed enhancement attempt (increments the attempt counter)
    async fn fail_details(&self, id: VisitId, error: &str) -> Result<(), PortError>;

    /// Records a persistence-worthy submission outcome (draft or live)
    async fn record_submission(&self, id: VisitId, record: SubmissionRecord)
        -> Result<(), PortError>;

    /// Records a submission error against the visit
    async fn record_submission_error(
        &self,
        id: VisitId,
        portal: Option<&str>,
        error: &str,
    ) -> Result<(), PortError>;
}

/// How a patient was located in the clinic system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatientMatch {
    /// Stable numeric record-number lookup
    RecordNumber,
    /// Name search fallback (ambiguous, subject to formatting drift)
    NameSearch,
}

impl PatientMatch {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatientMatch::RecordNumber => "record_number",
            PatientMatch::NameSearch => "name_search",
        }
    }
}

/// A located patient in the clinic system
#[derive(Debug, Clone)]
pub struct PatientHandle {
    /// The clinic system's internal patient id
    pub patient_id: String,
    /// NRIC shown on the patient profile, when visible
    pub nric: Option<Nric>,
    /// How the patient was found
    pub matched_by: PatientMatch,
}

/// Clinical details scraped for one visit date
#[derive(Debug, Clone, Default)]
pub struct VisitDetailsData {
    pub charge_type: Option<ChargeType>,
    pub diagnosis_text: Option<String>,
    pub diagnosis_code: Option<String>,
    pub mc_days: Option<u32>,
    pub mc_start_date: Option<NaiveDate>,
    /// Raw dispensing lines, junk included; the stage filters them
    pub medicines: Vec<MedicineLine>,
    pub treatment_summary: Option<String>,
}

/// Automation driver for the clinic management system
#[async_trait]
pub trait SourceDriver: DomainPort {
    /// Logs in and establishes the session shared across the batch
    async fn authenticate(&self) -> Result<(), PortError>;

    /// Looks a patient up by the stable record number
    async fn find_by_record_number(
        &self,
        record_number: &str,
    ) -> Result<Option<PatientHandle>, PortError>;

    /// Name-search fallback
    async fn find_by_name(&self, name: &str) -> Result<Option<PatientHandle>, PortError>;

    /// Scrapes the clinical details screen for the given visit date
    async fn fetch_visit_details(
        &self,
        patient: &PatientHandle,
        date: NaiveDate,
    ) -> Result<VisitDetailsData, PortError>;

    /// Closes the session
    async fn end_session(&self) -> Result<(), PortError>;
}
