//! The three-valued flow-control verdict.

use serde::Deserialize;
use serde::Serialize;

/// Outcome of a hook run as seen by the host.
///
/// Used both as the target of per-exit-code mappings and as the aggregated
/// result of an invocation. Variant order is severity order: sorting ascending
/// puts the most severe verdict first, which is what the aggregator relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Verdict {
    #[serde(rename = "blocking-error")]
    BlockingError,
    #[serde(rename = "non-blocking-error")]
    NonBlockingError,
    #[serde(rename = "success")]
    Success,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::BlockingError => "blocking-error",
            Verdict::NonBlockingError => "non-blocking-error",
            Verdict::Success => "success",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "blocking-error" => Some(Verdict::BlockingError),
            "non-blocking-error" => Some(Verdict::NonBlockingError),
            "success" => Some(Verdict::Success),
            _ => None,
        }
    }

    /// True when `self` is strictly more severe than `other`.
    pub fn is_more_severe_than(&self, other: Verdict) -> bool {
        *self < other
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
