//! NRIC/FIN patient identifier value object
//!
//! Group-A insurance portals are searched by the patient's national identifier
//! (NRIC for residents, FIN for pass holders). The source system records it in
//! several places with inconsistent casing and spacing, so the value object
//! normalizes on construction and offers a structural scan for digging the
//! identifier out of free-form diagnostic text.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Structural pattern: prefix letter, seven digits, checksum letter.
///
/// S/T prefixes are NRICs, F/G/M prefixes are FINs. The checksum letter is
/// not verified here - the source system is the authority on validity, this
/// engine only needs to recognize the shape.
static NRIC_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[STFGMstfgm]\d{7}[A-Za-z]\b").expect("static pattern compiles"));

static NRIC_EXACT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[STFGM]\d{7}[A-Z]$").expect("static pattern compiles"));

/// A normalized NRIC or FIN
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Nric(String);

impl Nric {
    /// Parses and normalizes an identifier, rejecting anything that does not
    /// match the structural pattern
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let normalized: String = raw
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_uppercase();

        if NRIC_EXACT.is_match(&normalized) {
            Ok(Self(normalized))
        } else {
            Err(CoreError::validation(format!(
                "'{}' is not a structurally valid NRIC/FIN",
                raw
            )))
        }
    }

    /// Returns the normalized identifier string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for FINs (foreign identification numbers)
    pub fn is_fin(&self) -> bool {
        matches!(self.0.as_bytes()[0], b'F' | b'G' | b'M')
    }

    /// Scans free-form text for the first thing shaped like an NRIC/FIN
    ///
    /// Used to recover an identifier from enhancement diagnostic metadata when
    /// the visit record itself carries none.
    pub fn find_in_text(text: &str) -> Option<Self> {
        NRIC_PATTERN
            .find(text)
            .and_then(|m| Self::parse(m.as_str()).ok())
    }
}

impl fmt::Display for Nric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Nric {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_normalizes_case_and_whitespace() {
        let nric = Nric::parse(" s1234567a ").unwrap();
        assert_eq!(nric.as_str(), "S1234567A");
    }

    #[test]
    fn test_parse_rejects_wrong_shape() {
        assert!(Nric::parse("12345678").is_err());
        assert!(Nric::parse("S123456A").is_err());
        assert!(Nric::parse("X1234567A").is_err());
        assert!(Nric::parse("").is_err());
    }

    #[test]
    fn test_fin_detection() {
        assert!(Nric::parse("F7654321K").unwrap().is_fin());
        assert!(Nric::parse("G7654321K").unwrap().is_fin());
        assert!(!Nric::parse("S7654321K").unwrap().is_fin());
    }

    #[test]
    fn test_find_in_text() {
        let text = r#"{"source_method":"profile_page","note":"id T0345678Z seen on header"}"#;
        let found = Nric::find_in_text(text).unwrap();
        assert_eq!(found.as_str(), "T0345678Z");
    }

    #[test]
    fn test_find_in_text_none() {
        assert!(Nric::find_in_text("no identifier here, ticket 1234567").is_none());
    }
}
