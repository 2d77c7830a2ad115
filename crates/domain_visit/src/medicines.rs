//! Medicine-line heuristics
//!
//! The clinic system's dispensing screen mixes real drug lines with dosage
//! instructions, placeholder rows, and medical-certificate phrasing. What
//! reaches the claim form must be the drugs only, so classification is an
//! explicit predicate with named pattern groups rather than inline string
//! checks scattered through the enhancement stage.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::visit::MedicineLine;

/// Why a line was rejected from the medicine list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JunkLineKind {
    /// Dosage instruction text ("take 1 tablet twice daily")
    DosageInstruction,
    /// Bare placeholder word ("medicine", "nil")
    Placeholder,
    /// Medical-certificate phrasing leaked into the drug list ("unfit for duty")
    CertificatePhrase,
}

static DOSAGE_INSTRUCTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?ix)
        ^\s*(take|apply|use|consume|instil|chew)\b
        | \b(once|twice|thrice|\d+\s*times?)\s+(a\s+day|daily|a\s+night|nightly|per\s+day)\b
        | \bafter\s+(food|meals?)\b
        | \bbefore\s+(food|meals?|sleep|bed)\b
        ",
    )
    .expect("static pattern compiles")
});

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(medicine|medication|drug|item|nil|n/?a|-)\s*$")
        .expect("static pattern compiles")
});

static CERTIFICATE_PHRASE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(unfit\s+for\s+(duty|work|school)|medical\s+leave|hospitali[sz]ation\s+leave|light\s+duty|mc\s+given)\b")
        .expect("static pattern compiles")
});

static PROCEDURE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(dressing|injection|nebuli[sz]er|ear\s+syring|suture|removal|procedure|vaccination|wound\s+care)\b")
        .expect("static pattern compiles")
});

/// Classifies a raw dispensing line, returning the junk category if it is
/// not a real drug line
pub fn classify_junk(line: &str) -> Option<JunkLineKind> {
    if PLACEHOLDER.is_match(line) {
        return Some(JunkLineKind::Placeholder);
    }
    if CERTIFICATE_PHRASE.is_match(line) {
        return Some(JunkLineKind::CertificatePhrase);
    }
    if DOSAGE_INSTRUCTION.is_match(line) {
        return Some(JunkLineKind::DosageInstruction);
    }
    None
}

/// True for procedure-type line items (dressings, injections)
///
/// These are skippable on draft-only/verification runs: a deliberate
/// speed/safety trade-off when the claim will be reviewed by hand anyway.
pub fn is_procedure_line(name: &str) -> bool {
    PROCEDURE_LINE.is_match(name)
}

/// Drops junk lines from a raw dispensing list
pub fn filter_dispensed(lines: Vec<MedicineLine>) -> Vec<MedicineLine> {
    lines
        .into_iter()
        .filter(|line| classify_junk(&line.name).is_none())
        .collect()
}

/// Deduplicates lines case-insensitively by name, keeping the first
/// occurrence (the source screen repeats a drug when quantities are split)
pub fn dedupe_by_name(lines: &[MedicineLine]) -> Vec<MedicineLine> {
    let mut seen = std::collections::HashSet::new();
    lines
        .iter()
        .filter(|line| seen.insert(line.name.to_lowercase()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(name: &str) -> MedicineLine {
        MedicineLine::new(name, "1")
    }

    #[test]
    fn test_dosage_instructions_are_junk() {
        assert_eq!(
            classify_junk("Take 1 tablet twice daily"),
            Some(JunkLineKind::DosageInstruction)
        );
        assert_eq!(
            classify_junk("apply thinly after food"),
            Some(JunkLineKind::DosageInstruction)
        );
        assert_eq!(
            classify_junk("2 times a day before meals"),
            Some(JunkLineKind::DosageInstruction)
        );
    }

    #[test]
    fn test_placeholders_are_junk() {
        assert_eq!(classify_junk("medicine"), Some(JunkLineKind::Placeholder));
        assert_eq!(classify_junk("  Medicine  "), Some(JunkLineKind::Placeholder));
        assert_eq!(classify_junk("N/A"), Some(JunkLineKind::Placeholder));
    }

    #[test]
    fn test_certificate_phrases_are_junk() {
        assert_eq!(
            classify_junk("Unfit for duty for 2 days"),
            Some(JunkLineKind::CertificatePhrase)
        );
        assert_eq!(
            classify_junk("hospitalisation leave recommended"),
            Some(JunkLineKind::CertificatePhrase)
        );
    }

    #[test]
    fn test_real_drugs_pass() {
        assert_eq!(classify_junk("Paracetamol 500mg"), None);
        assert_eq!(classify_junk("Amoxicillin 250mg cap"), None);
        // Drug names containing instruction-adjacent words still pass.
        assert_eq!(classify_junk("Daily multivitamin"), None);
    }

    #[test]
    fn test_filter_dispensed() {
        let raw = vec![
            line("Paracetamol 500mg"),
            line("Take 1 tablet twice daily"),
            line("medicine"),
            line("Chlorpheniramine 4mg"),
            line("Unfit for duty"),
        ];
        let filtered = filter_dispensed(raw);
        let names: Vec<_> = filtered.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["Paracetamol 500mg", "Chlorpheniramine 4mg"]);
    }

    #[test]
    fn test_dedupe_is_case_insensitive() {
        let lines = vec![
            line("Paracetamol 500mg"),
            line("PARACETAMOL 500MG"),
            line("Loratadine 10mg"),
        ];
        let deduped = dedupe_by_name(&lines);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].name, "Paracetamol 500mg");
    }

    #[test]
    fn test_procedure_lines() {
        assert!(is_procedure_line("Wound dressing - small"));
        assert!(is_procedure_line("IM injection"));
        assert!(!is_procedure_line("Paracetamol 500mg"));
    }
}
