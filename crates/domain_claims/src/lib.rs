//! Claim Routing & Submission Domain
//!
//! Classifies a visit by its pay-type tag, selects a destination portal,
//! drives the portal automation to fill a claim form, and applies the
//! submission safety policy: never silently submit a real claim.
//!
//! # Safety Gate
//!
//! The stage may always *fill* a form. Only two actions are allowed to
//! mutate a visit's submission block: a draft save, or a live submit when
//! [`SubmissionPolicy::allow_live_submit`] is set. A driver-reported live
//! submission is overridden to a policy-blocked failure when the flag is
//! off; the driver's word is never trusted over the local policy.

pub mod error;
pub mod policy;
pub mod ports;
pub mod routing;
pub mod submission;

pub use error::ClaimError;
pub use policy::SubmissionPolicy;
pub use ports::{MemberHandle, MemberLookup, PortalDriver, SaveReceipt};
pub use routing::{route, Destination};
pub use submission::{OutcomeReason, SubmissionOutcome, SubmissionStage, CONSULT_FEE_PROBE};
