//! Visit Lifecycle Domain
//!
//! This crate implements a visit's journey through the enhancement stage:
//! the detail state machine, the clinical-field normalization rules, the
//! medicine-line heuristics, and the read-only validation gate run before
//! submission.
//!
//! # Detail State Machine
//!
//! ```text
//! Unset -> InProgress -> {Completed | Failed}
//! Failed -> InProgress          (retry, subject to the batch policy)
//! Completed -> InProgress       (forced reprocess)
//! InProgress -> InProgress      (recovery after a mid-attempt crash)
//! ```

pub mod visit;
pub mod medicines;
pub mod enhancement;
pub mod validation;
pub mod ports;
pub mod error;

pub use visit::{
    Visit, ChargeType, DetailsBlock, DetailsStatus, DetailsUpdate, MedicineLine,
    SubmissionBlock, SubmissionStatus, MISSING_DIAGNOSIS,
};
pub use medicines::{classify_junk, filter_dispensed, dedupe_by_name, is_procedure_line, JunkLineKind};
pub use enhancement::EnhancementStage;
pub use validation::{check_visit, GateCheck, GateReport, ValidationGate, SUSPICIOUS_DIAGNOSIS_TERMS};
pub use ports::{
    PatientHandle, PatientMatch, SourceDriver, SubmissionRecord, VisitDetailsData, VisitQuery,
    VisitStore,
};
pub use error::VisitError;
