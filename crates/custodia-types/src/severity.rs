use serde::{Deserialize, Serialize};

/// Severity of a compliance violation, totally ordered from `Info` to
/// `Critical`.
///
/// The derived `Ord` gives `Info < Low < Medium < High < Critical`, which the
/// decision engine relies on when taking the maximum across a violation set.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Severity {
    /// Informational finding; no enforcement consequence.
    Info,
    /// Minor deviation; worth a warning.
    Low,
    /// Deviation that requires the caller to re-authenticate.
    Medium,
    /// Serious deviation; the identity is quarantined pending review.
    High,
    /// Violation that must be blocked outright.
    Critical,
}

impl Severity {
    /// Numeric enforcement level, 0 (`Info`) through 4 (`Critical`).
    pub fn level(self) -> u8 {
        match self {
            Severity::Info => 0,
            Severity::Low => 1,
            Severity::Medium => 2,
            Severity::High => 3,
            Severity::Critical => 4,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "Info"),
            Severity::Low => write!(f, "Low"),
            Severity::Medium => write!(f, "Medium"),
            Severity::High => write!(f, "High"),
            Severity::Critical => write!(f, "Critical"),
        }
    }
}
