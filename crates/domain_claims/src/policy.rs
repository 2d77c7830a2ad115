//! Submission safety policy
//!
//! An explicit configuration object handed to the submission stage at
//! construction. Nothing in the stage reads the environment at call time;
//! what the run is allowed to persist is decided once, up front.

use serde::Serialize;

/// What the submission stage may persist
///
/// The stage can always *fill* a claim form. Only two actions may mutate a
/// visit's submission block: a draft save, or a live submit when
/// `allow_live_submit` is set. All three flags default to off, which makes
/// the default a fill-only verification run that writes nothing.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SubmissionPolicy {
    /// Permit a true portal submission. Off means any live submission the
    /// portal reports is overridden to a policy-blocked failure.
    pub allow_live_submit: bool,
    /// Save the filled claim as a portal draft and record it
    pub save_as_draft: bool,
    /// In fill-only mode, still record per-visit errors. Off keeps
    /// verification runs from writing error noise into production rows.
    pub persist_errors_in_fill_only: bool,
}

impl SubmissionPolicy {
    /// Fill the form but never touch the portal's save controls
    pub fn is_fill_only(&self) -> bool {
        !self.save_as_draft
    }

    /// True when an error outcome may be written to the visit row
    pub fn may_record_errors(&self) -> bool {
        self.save_as_draft || self.persist_errors_in_fill_only
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_is_fill_only_and_silent() {
        let policy = SubmissionPolicy::default();
        assert!(policy.is_fill_only());
        assert!(!policy.may_record_errors());
        assert!(!policy.allow_live_submit);
    }

    #[test]
    fn test_draft_mode_records_errors() {
        let policy = SubmissionPolicy {
            save_as_draft: true,
            ..Default::default()
        };
        assert!(!policy.is_fill_only());
        assert!(policy.may_record_errors());
    }

    #[test]
    fn test_fill_only_error_persistence_is_opt_in() {
        let policy = SubmissionPolicy {
            persist_errors_in_fill_only: true,
            ..Default::default()
        };
        assert!(policy.is_fill_only());
        assert!(policy.may_record_errors());
    }
}
