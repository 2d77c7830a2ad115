//! Pay-type routing table
//!
//! Source tagging is free text entered by clinic staff, so routing matches
//! case-insensitively by substring against an ordered table. The first
//! matching row wins; order is the tie-breaker, not specificity.

/// Where a pay-type tag routes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// The MHC portal family. Sub-brands share one underlying system, so a
    /// single automation driver covers all of them.
    Mhc,
    /// A portal we recognize but do not automate
    Recognized(&'static str),
    /// The tag matched nothing in the table
    Unknown,
}

impl Destination {
    /// Portal display name, where one is known
    pub fn portal_name(&self) -> Option<&'static str> {
        match self {
            Destination::Mhc => Some("MHC"),
            Destination::Recognized(name) => Some(name),
            Destination::Unknown => None,
        }
    }
}

/// Ordered routing rows. "mhc" must stay ahead of nothing in particular
/// today, but the order is load-bearing the moment two patterns overlap.
const ROUTES: &[(&str, Destination)] = &[
    ("mhc", Destination::Mhc),
    ("ihp", Destination::Recognized("IHP")),
    ("fullerton", Destination::Recognized("Fullerton Health")),
    ("alliance", Destination::Recognized("Alliance Healthcare")),
    ("aia", Destination::Recognized("AIA")),
];

/// The substring patterns of every routed pay type. Callers use these to
/// widen a query to portal-bound visits only.
pub fn routed_patterns() -> impl Iterator<Item = &'static str> {
    ROUTES.iter().map(|(pattern, _)| *pattern)
}

/// Classifies a pay-type tag
pub fn route(pay_type: &str) -> Destination {
    let lowered = pay_type.to_lowercase();
    for (pattern, destination) in ROUTES {
        if lowered.contains(pattern) {
            return *destination;
        }
    }
    Destination::Unknown
}
