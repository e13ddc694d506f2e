//! Severity levels for event candidates and notification rules.
//!
//! Ordering matters: the rule engine gates dispatch on
//! `candidate.severity >= rule.min_severity`, so the variants are declared
//! lowest to highest and the derived `Ord` does the ranking.

use serde::{Deserialize, Serialize};

/// Severity of an event candidate or the minimum severity of a rule.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Info,
    Warn,
    Critical,
}

impl Severity {
    /// Numeric rank (info=0 < warn=1 < critical=2).
    pub fn rank(&self) -> u8 {
        match self {
            Severity::Info => 0,
            Severity::Warn => 1,
            Severity::Critical => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warn => "warn",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
