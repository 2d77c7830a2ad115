//! Portal driver port
//!
//! The submission stage never depends on selector or DOM strategy. The
//! driver exposes typed capability methods per form interaction, and the
//! "this member belongs under a different sub-system" instruction is a
//! first-class result variant, never string-matched dialog text.

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;

use core_kernel::{DomainPort, Nric, PortError};
use domain_visit::{ChargeType, MedicineLine};

/// A member record opened in the portal
#[derive(Debug, Clone)]
pub struct MemberHandle {
    /// The portal's internal member id
    pub member_id: String,
    /// The context (sub-system) the member was found under
    pub context: String,
}

/// Result of a member search
#[derive(Debug, Clone)]
pub enum MemberLookup {
    /// The member exists in the current context
    Found(MemberHandle),
    /// The member does not exist. Terminal for this attempt; retrying will
    /// not change whether the member exists.
    NotFound,
    /// The portal instructs that this member must be handled under a
    /// different sub-system. `context` is the destination to switch to,
    /// `instruction` is the portal's own wording, kept for audit.
    UseAlternate {
        instruction: String,
        context: String,
    },
}

/// Result of the portal's save action
#[derive(Debug, Clone)]
pub struct SaveReceipt {
    /// The claim was stored as a draft
    pub saved: bool,
    /// A live submission occurred. The stage re-checks this against the
    /// policy; the driver's word is not trusted over the safety gate.
    pub submitted: bool,
    /// Portal reference number, when one was issued
    pub reference: Option<String>,
}

/// Automation driver for a claim portal
#[async_trait]
pub trait PortalDriver: DomainPort {
    /// Logs in and establishes the session shared across the batch
    async fn authenticate(&self) -> Result<(), PortError>;

    /// Switches the active sub-system context
    async fn select_context(&self, context: &str) -> Result<(), PortError>;

    /// Searches the active context for a member by national identifier
    async fn find_member(&self, nric: &Nric) -> Result<MemberLookup, PortError>;

    /// Opens a fresh claim form for the member
    async fn open_claim_form(&self, member: &MemberHandle) -> Result<(), PortError>;

    /// Fills the visit date field
    async fn fill_visit_date(&self, date: NaiveDate) -> Result<(), PortError>;

    /// Selects the charge-type control (first consult and follow-up are
    /// distinct form controls, not labels)
    async fn select_charge_type(&self, charge_type: ChargeType) -> Result<(), PortError>;

    /// Fills the consultation fee field
    async fn fill_consultation_fee(&self, amount: Decimal) -> Result<(), PortError>;

    /// Fills MC days (zero included) and the MC start date
    async fn fill_medical_certificate(
        &self,
        days: u32,
        start_date: Option<NaiveDate>,
    ) -> Result<(), PortError>;

    /// Selects the diagnosis, structured code first with free-text fallback
    async fn select_diagnosis(
        &self,
        code: Option<&str>,
        text: &str,
    ) -> Result<(), PortError>;

    /// Adds one medicine line to the claim
    async fn add_medicine(&self, line: &MedicineLine) -> Result<(), PortError>;

    /// Triggers the portal's save action
    async fn save_draft(&self) -> Result<SaveReceipt, PortError>;

    /// Closes the session
    async fn end_session(&self) -> Result<(), PortError>;
}
