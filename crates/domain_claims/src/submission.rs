//! Claim submission stage
//!
//! Routes a visit to its destination portal and drives the portal driver
//! through search, a one-shot re-route if the portal demands it, form fill,
//! and the policy-gated persistence step. Every path out of here is a
//! structured [`SubmissionOutcome`]; only a dead session or an unreachable
//! store aborts the batch.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use tracing::{info, warn};

use core_kernel::{Nric, PortError};
use domain_batch::{RunType, StageError, StageOutcome, StageProcessor, StageState, StageStatus};
use domain_visit::medicines::{dedupe_by_name, is_procedure_line};
use domain_visit::{
    MedicineLine, SubmissionRecord, SubmissionStatus, Visit, VisitStore, MISSING_DIAGNOSIS,
};

use crate::error::ClaimError;
use crate::policy::SubmissionPolicy;
use crate::ports::{MemberHandle, MemberLookup, PortalDriver, SaveReceipt};
use crate::routing::{route, Destination};

/// Deliberate overflow value for the consultation fee field
///
/// The portal caps the fee itself and asks for an "apply maximum allowed"
/// confirmation; probing with an overflow beats computing the fee locally,
/// because the cap lives in the portal and changes without notice.
pub const CONSULT_FEE_PROBE: Decimal = dec!(99999);

/// Why a submission did not succeed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeReason {
    /// Recognized portal with no automation; deliberate no-op
    NotImplemented,
    /// Pay type matched nothing in the routing table; deliberate no-op
    UnknownPayType,
    /// The visit is missing data the portal requires
    ValidationError,
    /// The member does not exist in the portal
    NotFound,
    /// A real portal action was overridden by the safety policy
    PolicyBlocked,
    /// A driver call failed
    AutomationError,
}

impl OutcomeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeReason::NotImplemented => "not_implemented",
            OutcomeReason::UnknownPayType => "unknown_pay_type",
            OutcomeReason::ValidationError => "validation_error",
            OutcomeReason::NotFound => "not_found",
            OutcomeReason::PolicyBlocked => "policy_blocked",
            OutcomeReason::AutomationError => "automation_error",
        }
    }
}

/// Structured result of one submission attempt
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionOutcome {
    pub success: bool,
    pub reason: Option<OutcomeReason>,
    pub portal: Option<String>,
    pub saved_as_draft: bool,
    pub submitted: bool,
    /// The alternate context switched to, when the portal re-routed us
    pub routing_override: Option<String>,
    pub error: Option<String>,
}

impl SubmissionOutcome {
    fn no_op(reason: OutcomeReason, portal: Option<&str>) -> Self {
        Self {
            success: false,
            reason: Some(reason),
            portal: portal.map(str::to_string),
            saved_as_draft: false,
            submitted: false,
            routing_override: None,
            error: None,
        }
    }

    fn filled_only(portal: &str, routing_override: Option<String>) -> Self {
        Self {
            success: true,
            reason: None,
            portal: Some(portal.to_string()),
            saved_as_draft: false,
            submitted: false,
            routing_override,
            error: None,
        }
    }

    fn persisted(portal: &str, receipt: &SaveReceipt, routing_override: Option<String>) -> Self {
        Self {
            success: true,
            reason: None,
            portal: Some(portal.to_string()),
            saved_as_draft: receipt.saved && !receipt.submitted,
            submitted: receipt.submitted,
            routing_override,
            error: None,
        }
    }
}

/// Outcome of the member search, re-route included
enum Location {
    Member {
        member: MemberHandle,
        routing_override: Option<String>,
    },
    NotFound,
    OverrideFailed {
        error: ClaimError,
        context: String,
    },
}

/// Fills and optionally persists claims on the destination portal
pub struct SubmissionStage {
    store: Arc<dyn VisitStore>,
    driver: Arc<dyn PortalDriver>,
    policy: SubmissionPolicy,
    keep_session: bool,
}

impl SubmissionStage {
    pub fn new(
        store: Arc<dyn VisitStore>,
        driver: Arc<dyn PortalDriver>,
        policy: SubmissionPolicy,
    ) -> Self {
        Self {
            store,
            driver,
            policy,
            keep_session: false,
        }
    }

    /// Leaves the portal session open after the batch, for manual
    /// verification of filled forms
    pub fn keep_session(mut self, keep: bool) -> Self {
        self.keep_session = keep;
        self
    }

    /// Submits one visit end to end
    pub async fn submit(&self, visit: &Visit) -> Result<SubmissionOutcome, StageError> {
        let portal = match route(&visit.pay_type) {
            Destination::Mhc => "MHC",
            Destination::Recognized(name) => {
                info!(visit_id = %visit.id, portal = name, "portal not automated, skipping");
                return Ok(SubmissionOutcome::no_op(
                    OutcomeReason::NotImplemented,
                    Some(name),
                ));
            }
            Destination::Unknown => {
                info!(visit_id = %visit.id, pay_type = %visit.pay_type, "unknown pay type, skipping");
                return Ok(SubmissionOutcome::no_op(OutcomeReason::UnknownPayType, None));
            }
        };

        // Identifier precondition, checked before any driver interaction so
        // a data-completeness problem is never misreported as a portal error.
        let Some(nric) = resolve_identifier(visit) else {
            let error = ClaimError::validation(format!(
                "no NRIC/FIN on visit {} or in its enhancement metadata",
                visit.id
            ));
            return self
                .fail(visit, portal, OutcomeReason::ValidationError, error.to_string(), None)
                .await;
        };

        let located = match self.locate_member(visit, &nric).await {
            Ok(located) => located,
            Err(error) => return self.driver_failure(visit, portal, error, None).await,
        };
        let (member, routing_override) = match located {
            Location::Member {
                member,
                routing_override,
            } => (member, routing_override),
            Location::NotFound => {
                return self
                    .fail(
                        visit,
                        portal,
                        OutcomeReason::NotFound,
                        format!("member {nric} not found in {portal}"),
                        None,
                    )
                    .await;
            }
            Location::OverrideFailed { error, context } => {
                return self
                    .fail(
                        visit,
                        portal,
                        OutcomeReason::AutomationError,
                        error.to_string(),
                        Some(context),
                    )
                    .await;
            }
        };

        if let Err(error) = self.fill_form(visit, &member).await {
            return self
                .driver_failure(visit, portal, error, routing_override)
                .await;
        }

        // The safety gate. Filling is always permitted; from here on, only a
        // draft save or a policy-allowed live submit may touch the store.
        if self.policy.is_fill_only() {
            info!(visit_id = %visit.id, portal, "fill-only run, nothing persisted");
            return Ok(SubmissionOutcome::filled_only(portal, routing_override));
        }

        let receipt = match self.driver.save_draft().await {
            Ok(receipt) => receipt,
            Err(error) => {
                return self
                    .driver_failure(visit, portal, error, routing_override)
                    .await;
            }
        };

        if receipt.submitted && !self.policy.allow_live_submit {
            // A real remote action occurred, so this error is recorded
            // unconditionally; the policy gate only suppresses noise, not
            // evidence.
            let error = ClaimError::PolicyBlocked {
                portal: portal.to_string(),
            };
            warn!(visit_id = %visit.id, portal, "live submission reported, overriding to policy-blocked");
            self.store
                .record_submission_error(visit.id, Some(portal), &error.to_string())
                .await
                .map_err(store_error)?;
            return Ok(SubmissionOutcome {
                success: false,
                reason: Some(OutcomeReason::PolicyBlocked),
                portal: Some(portal.to_string()),
                saved_as_draft: receipt.saved,
                submitted: true,
                routing_override,
                error: Some(error.to_string()),
            });
        }

        if !receipt.saved && !receipt.submitted {
            return self
                .fail(
                    visit,
                    portal,
                    OutcomeReason::AutomationError,
                    "portal reported neither a saved draft nor a submission".to_string(),
                    routing_override,
                )
                .await;
        }

        let record = SubmissionRecord {
            portal: portal.to_string(),
            saved_as_draft: receipt.saved && !receipt.submitted,
            submitted: receipt.submitted,
            metadata: serde_json::json!({
                "reference": receipt.reference,
                "routing_override": routing_override,
            }),
            at: Utc::now(),
        };
        self.store
            .record_submission(visit.id, record)
            .await
            .map_err(store_error)?;

        info!(
            visit_id = %visit.id,
            portal,
            submitted = receipt.submitted,
            "claim persisted"
        );
        Ok(SubmissionOutcome::persisted(portal, &receipt, routing_override))
    }

    /// Searches for the member, honoring at most one re-route instruction.
    ///
    /// A second instruction, or a miss after switching, fails with an error
    /// naming the instruction that triggered the switch. Never loops twice.
    async fn locate_member(&self, visit: &Visit, nric: &Nric) -> Result<Location, PortError> {
        let lookup = self.driver.find_member(nric).await?;
        let (instruction, context) = match lookup {
            MemberLookup::Found(member) => {
                return Ok(Location::Member {
                    member,
                    routing_override: None,
                })
            }
            MemberLookup::NotFound => return Ok(Location::NotFound),
            MemberLookup::UseAlternate {
                instruction,
                context,
            } => (instruction, context),
        };

        info!(
            visit_id = %visit.id,
            %instruction,
            %context,
            "portal re-route instruction, switching context once"
        );
        self.driver.select_context(&context).await?;

        match self.driver.find_member(nric).await? {
            MemberLookup::Found(member) => Ok(Location::Member {
                member,
                routing_override: Some(context),
            }),
            MemberLookup::NotFound => Ok(Location::OverrideFailed {
                error: ClaimError::OverrideFailed {
                    instruction,
                    detail: "member not found in the alternate context".to_string(),
                },
                context,
            }),
            MemberLookup::UseAlternate {
                instruction: second,
                ..
            } => Ok(Location::OverrideFailed {
                error: ClaimError::OverrideFailed {
                    instruction,
                    detail: format!("portal asked for a second switch ('{second}'), refusing to loop"),
                },
                context,
            }),
        }
    }

    async fn fill_form(&self, visit: &Visit, member: &MemberHandle) -> Result<(), PortError> {
        self.driver.open_claim_form(member).await?;
        self.driver.fill_visit_date(visit.visit_date).await?;
        if let Some(charge_type) = visit.charge_type {
            self.driver.select_charge_type(charge_type).await?;
        }
        self.driver.fill_consultation_fee(CONSULT_FEE_PROBE).await?;
        // MC days always set explicitly, zero included, so the portal never
        // falls back to an invalid placeholder.
        self.driver
            .fill_medical_certificate(visit.mc_days.unwrap_or(0), visit.mc_start_date)
            .await?;
        let diagnosis = visit.diagnosis_text.as_deref().unwrap_or(MISSING_DIAGNOSIS);
        self.driver
            .select_diagnosis(visit.diagnosis_code.as_deref(), diagnosis)
            .await?;
        for line in self.claim_medicines(visit) {
            self.driver.add_medicine(&line).await?;
        }
        Ok(())
    }

    /// Deduplicates case-insensitively by name; procedure-type lines are
    /// skipped unless the run may actually submit, as a speed/safety
    /// trade-off on verification runs.
    fn claim_medicines(&self, visit: &Visit) -> Vec<MedicineLine> {
        let deduped = dedupe_by_name(&visit.medicines);
        if self.policy.allow_live_submit {
            deduped
        } else {
            deduped
                .into_iter()
                .filter(|line| !is_procedure_line(&line.name))
                .collect()
        }
    }

    /// Records a per-visit failure, subject to the error-persistence policy
    async fn fail(
        &self,
        visit: &Visit,
        portal: &str,
        reason: OutcomeReason,
        error: String,
        routing_override: Option<String>,
    ) -> Result<SubmissionOutcome, StageError> {
        warn!(visit_id = %visit.id, portal, reason = reason.as_str(), %error, "submission failed");
        if self.policy.may_record_errors() {
            self.store
                .record_submission_error(visit.id, Some(portal), &error)
                .await
                .map_err(store_error)?;
        }
        Ok(SubmissionOutcome {
            success: false,
            reason: Some(reason),
            portal: Some(portal.to_string()),
            saved_as_draft: false,
            submitted: false,
            routing_override,
            error: Some(error),
        })
    }

    /// Driver errors stay per-visit unless the session itself is gone
    async fn driver_failure(
        &self,
        visit: &Visit,
        portal: &str,
        error: PortError,
        routing_override: Option<String>,
    ) -> Result<SubmissionOutcome, StageError> {
        if error.is_batch_fatal() {
            return Err(StageError::Fatal(error));
        }
        self.fail(
            visit,
            portal,
            OutcomeReason::AutomationError,
            error.to_string(),
            routing_override,
        )
        .await
    }
}

/// Visit's own field first, then a structural scan of the enhancement
/// metadata
fn resolve_identifier(visit: &Visit) -> Option<Nric> {
    if let Some(nric) = &visit.nric {
        return Some(nric.clone());
    }
    Nric::find_in_text(&visit.details.sources.to_string())
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
impl StageProcessor<Visit> for SubmissionStage {
    fn run_type(&self) -> RunType {
        RunType::Submission
    }

    fn item_id(&self, visit: &Visit) -> String {
        visit.id.to_string()
    }

    fn stage_state(&self, visit: &Visit) -> StageState {
        // No per-visit submission attempt counter exists; retry budgeting
        // applies to enhancement only.
        let status = match visit.submission.status {
            SubmissionStatus::Unset => StageStatus::Unset,
            SubmissionStatus::Draft | SubmissionStatus::Submitted => StageStatus::Completed,
            SubmissionStatus::Error => StageStatus::Failed,
        };
        StageState::new(status, 0)
    }

    async fn prepare(&self) -> Result<(), StageError> {
        self.driver.authenticate().await.map_err(StageError::Fatal)
    }

    async fn process(&self, visit: &Visit) -> Result<StageOutcome, StageError> {
        let outcome = self.submit(visit).await?;
        Ok(match outcome.reason {
            Some(reason @ (OutcomeReason::NotImplemented | OutcomeReason::UnknownPayType)) => {
                StageOutcome::NoOp {
                    reason: reason.as_str().to_string(),
                }
            }
            _ if outcome.success => StageOutcome::Completed,
            Some(reason) => StageOutcome::Failed {
                error: outcome
                    .error
                    .unwrap_or_else(|| reason.as_str().to_string()),
            },
            None => StageOutcome::Failed {
                error: "submission failed without a recorded reason".to_string(),
            },
        })
    }

    async fn finish(&self) {
        if self.keep_session {
            info!("leaving portal session open for manual verification");
            return;
        }
        if let Err(error) = self.driver.end_session().await {
            warn!(%error, "failed to close portal session");
        }
    }
}
