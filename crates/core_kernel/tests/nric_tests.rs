//! Tests for the NRIC/FIN value object

use core_kernel::Nric;
use proptest::prelude::*;

#[test]
fn parse_accepts_all_known_prefixes() {
    for prefix in ['S', 'T', 'F', 'G', 'M'] {
        let raw = format!("{}1234567A", prefix);
        assert!(Nric::parse(&raw).is_ok(), "prefix {} should parse", prefix);
    }
}

#[test]
fn find_in_text_picks_first_match() {
    let text = "member S1111111A replaced by T2222222B";
    assert_eq!(Nric::find_in_text(text).unwrap().as_str(), "S1111111A");
}

proptest! {
    #[test]
    fn valid_shapes_round_trip(prefix in "[STFGM]", digits in "[0-9]{7}", check in "[A-Z]") {
        let raw = format!("{}{}{}", prefix, digits, check);
        let parsed = Nric::parse(&raw).unwrap();
        prop_assert_eq!(parsed.as_str(), raw.as_str());
        prop_assert_eq!(Nric::parse(&raw.to_lowercase()).unwrap(), parsed);
    }

    #[test]
    fn shorter_digit_runs_never_parse(prefix in "[STFGM]", digits in "[0-9]{1,6}", check in "[A-Z]") {
        let raw = format!("{}{}{}", prefix, digits, check);
        prop_assert!(Nric::parse(&raw).is_err());
    }
}
