//! End-of-run summary printing
//!
//! Expected per-visit outcomes are operational facts, not crashes; they are
//! printed as counted lines with a bounded sample, never as stack traces.

use domain_batch::BatchReport;
use domain_visit::GateReport;

/// How many failing visits get listed individually
const FAILURE_SAMPLE: usize = 10;

pub fn print_batch(label: &str, report: &BatchReport) {
    println!();
    println!("{label} run {}", report.run_id);
    println!(
        "  {} visits: {} completed, {} failed, {} skipped",
        report.total, report.completed, report.failed, report.skipped
    );

    let sample = report.failure_sample(FAILURE_SAMPLE);
    if !sample.is_empty() {
        println!("  failures:");
        for (id, reason) in &sample {
            println!("    {id}: {reason}");
        }
        if report.failed as usize > sample.len() {
            println!(
                "    ... and {} more (see the run record)",
                report.failed as usize - sample.len()
            );
        }
    }
}

pub fn print_gate(report: &GateReport) {
    println!();
    println!("validation gate: {} visits scanned", report.scanned);
    println!("  {} passed", report.passed);
    if report.not_completed > 0 {
        println!("  {} not enhanced", report.not_completed);
    }
    if report.missing_nric > 0 {
        println!("  {} missing identifier", report.missing_nric);
    }
    if report.missing_diagnosis > 0 {
        println!("  {} missing diagnosis", report.missing_diagnosis);
    }
    if report.suspicious_diagnosis > 0 {
        println!("  {} suspicious diagnosis", report.suspicious_diagnosis);
    }
    if report.empty_medicines > 0 {
        println!("  {} without medicines", report.empty_medicines);
    }

    for finding in report.findings.iter().take(FAILURE_SAMPLE) {
        let mut problems = Vec::new();
        if !finding.details_completed {
            problems.push("not enhanced".to_string());
        }
        if !finding.nric_present {
            problems.push("no identifier".to_string());
        }
        if !finding.diagnosis_present {
            problems.push("no diagnosis".to_string());
        }
        if let Some(term) = &finding.suspicious_term {
            problems.push(format!("suspicious diagnosis (\"{term}\")"));
        }
        if !finding.has_medicines {
            problems.push("no medicines".to_string());
        }
        println!(
            "    {} ({}): {}",
            finding.visit_id,
            finding.patient_name,
            problems.join(", ")
        );
    }
    if report.findings.len() > FAILURE_SAMPLE {
        println!(
            "    ... and {} more findings",
            report.findings.len() - FAILURE_SAMPLE
        );
    }

    if report.hard_failure() {
        println!("  RESULT: FAIL (unenhanced or suspicious visits in range)");
    } else {
        println!("  RESULT: PASS");
    }
}
