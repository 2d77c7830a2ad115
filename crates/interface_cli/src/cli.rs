//! Argument surface for the `claims` binary
//!
//! Scope flags are shared across subcommands and translate into a
//! [`VisitQuery`]. A bare invocation with no scope refuses to run; an
//! unscoped full-table batch requires the explicit `--all` opt-in.

use anyhow::bail;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use core_kernel::VisitId;
use domain_batch::BatchPolicy;
use domain_claims::{routing, SubmissionPolicy};
use domain_visit::VisitQuery;

#[derive(Debug, Parser)]
#[command(
    name = "claims",
    about = "Clinic visit enhancement and insurance claim submission batches",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Fetch clinical details from the clinic system into the visit records
    Enhance {
        #[command(flatten)]
        scope: ScopeArgs,
        #[command(flatten)]
        batch: BatchArgs,
    },
    /// Route visits by pay type and drive the portal claim forms
    Submit {
        #[command(flatten)]
        scope: ScopeArgs,
        #[command(flatten)]
        batch: BatchArgs,
        #[command(flatten)]
        submission: SubmissionArgs,
    },
    /// Read-only consistency gate over the scoped visits; writes nothing
    Validate {
        #[command(flatten)]
        scope: ScopeArgs,
    },
}

/// Which visits a batch covers
#[derive(Debug, Args)]
pub struct ScopeArgs {
    /// Visit id to process; repeat the flag for several
    #[arg(long = "id", value_name = "VISIT_ID")]
    pub ids: Vec<VisitId>,

    /// Case-insensitive substring matched against the pay-type tag
    #[arg(long, value_name = "TAG")]
    pub pay_type: Option<String>,

    /// Inclusive start of the visit-date range
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub from: Option<NaiveDate>,

    /// Inclusive end of the visit-date range
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub to: Option<NaiveDate>,

    /// Restrict to pay types that route to a known portal
    #[arg(long)]
    pub portal_only: bool,

    /// Explicitly allow a run over every visit in the store
    #[arg(long)]
    pub all: bool,
}

impl ScopeArgs {
    /// Builds the candidate query, refusing accidental full-table runs
    pub fn to_query(&self) -> anyhow::Result<VisitQuery> {
        if let (Some(from), Some(to)) = (self.from, self.to) {
            if from > to {
                bail!("--from {from} is after --to {to}");
            }
        }

        let mut query = VisitQuery {
            ids: self.ids.clone(),
            date_from: self.from,
            date_to: self.to,
            ..Default::default()
        };
        if let Some(pattern) = &self.pay_type {
            query = query.with_pay_type(pattern.clone());
        }
        if self.portal_only {
            for pattern in routing::routed_patterns() {
                query = query.with_pay_type(pattern);
            }
        }

        if query.is_unscoped() && !self.all {
            bail!(
                "no scope given; pass --id/--pay-type/--from/--to/--portal-only, \
                 or --all to run over every visit"
            );
        }

        Ok(query)
    }
}

/// How the batch treats already-processed and failed items
#[derive(Debug, Args)]
pub struct BatchArgs {
    /// Reprocess visits even when already completed
    #[arg(long)]
    pub force: bool,

    /// Only reprocess currently-failed visits, ignoring the attempt budget
    #[arg(long)]
    pub retry_failed: bool,

    /// Attempt budget for failed visits
    #[arg(long, value_name = "N", default_value_t = 3)]
    pub max_retries: u32,
}

impl BatchArgs {
    pub fn policy(&self) -> BatchPolicy {
        BatchPolicy {
            max_retries: self.max_retries,
            force: self.force,
            retry_failed_only: self.retry_failed,
        }
    }
}

/// What the submission stage is allowed to persist. Everything defaults to
/// off: a flagless run fills forms and writes nothing anywhere.
#[derive(Debug, Args)]
pub struct SubmissionArgs {
    /// Save each filled claim as a portal draft and record it on the visit
    #[arg(long)]
    pub save_as_draft: bool,

    /// Permit actual claim submission to be recorded as such
    #[arg(long)]
    pub allow_live_submit: bool,

    /// Record per-visit errors even on a fill-only run
    #[arg(long)]
    pub persist_errors: bool,

    /// Leave the portal session open afterwards for manual verification
    #[arg(long)]
    pub keep_session: bool,
}

impl SubmissionArgs {
    pub fn policy(&self) -> SubmissionPolicy {
        SubmissionPolicy {
            allow_live_submit: self.allow_live_submit,
            save_as_draft: self.save_as_draft,
            persist_errors_in_fill_only: self.persist_errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).expect("arguments should parse")
    }

    #[test]
    fn test_bare_invocation_refuses_to_build_a_query() {
        let cli = parse(&["claims", "enhance"]);
        let Commands::Enhance { scope, .. } = cli.command else {
            panic!("expected enhance");
        };
        let error = scope.to_query().unwrap_err();
        assert!(error.to_string().contains("--all"));
    }

    #[test]
    fn test_all_flag_permits_an_unscoped_query() {
        let cli = parse(&["claims", "enhance", "--all"]);
        let Commands::Enhance { scope, .. } = cli.command else {
            panic!("expected enhance");
        };
        assert!(scope.to_query().unwrap().is_unscoped());
    }

    #[test]
    fn test_portal_only_expands_into_routed_patterns() {
        let cli = parse(&["claims", "submit", "--portal-only"]);
        let Commands::Submit { scope, .. } = cli.command else {
            panic!("expected submit");
        };
        let query = scope.to_query().unwrap();
        assert!(query.pay_type_patterns.iter().any(|p| p == "mhc"));
        assert!(query.pay_type_patterns.iter().any(|p| p == "ihp"));
    }

    #[test]
    fn test_inverted_date_range_is_rejected() {
        let cli = parse(&[
            "claims", "validate", "--from", "2024-03-31", "--to", "2024-03-01",
        ]);
        let Commands::Validate { scope } = cli.command else {
            panic!("expected validate");
        };
        assert!(scope.to_query().is_err());
    }

    #[test]
    fn test_repeated_ids_collect() {
        let a = VisitId::new();
        let b = VisitId::new();
        let cli = parse(&[
            "claims",
            "enhance",
            "--id",
            &a.to_string(),
            "--id",
            &b.to_string(),
        ]);
        let Commands::Enhance { scope, .. } = cli.command else {
            panic!("expected enhance");
        };
        assert_eq!(scope.to_query().unwrap().ids, vec![a, b]);
    }

    #[test]
    fn test_submission_flags_map_onto_the_policy() {
        let cli = parse(&["claims", "submit", "--all", "--save-as-draft"]);
        let Commands::Submit { submission, .. } = cli.command else {
            panic!("expected submit");
        };
        let policy = submission.policy();
        assert!(policy.save_as_draft);
        assert!(!policy.allow_live_submit);
        assert!(!policy.persist_errors_in_fill_only);
    }

    #[test]
    fn test_batch_defaults() {
        let cli = parse(&["claims", "enhance", "--all"]);
        let Commands::Enhance { batch, .. } = cli.command else {
            panic!("expected enhance");
        };
        let policy = batch.policy();
        assert_eq!(policy.max_retries, 3);
        assert!(!policy.force);
        assert!(!policy.retry_failed_only);
    }
}
