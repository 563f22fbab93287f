//! Operator-specific retry exceptions, loaded from `[[classifier.overrides]]`.

use super::FailCause;
use crate::transport::AlarmPrecision;
use serde::{Deserialize, Serialize};

/// One carrier exception: `cause` stays retryable with its own timer source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorOverride {
    pub cause: FailCause,
    /// `exact` aligns the retry alarm precisely (network-mandated back-off);
    /// `approximate` lets it coalesce with other alarms.
    #[serde(default)]
    pub precision: AlarmPrecision,
    /// Fixed delay; when absent the policy's backoff slot is used.
    #[serde(default)]
    pub delay_ms: Option<u64>,
    /// Keep retrying across RAT / registration changes.
    #[serde(default)]
    pub survives_service_change: bool,
    /// Only apply to requests issued for one of these reasons (empty: all).
    #[serde(default)]
    pub only_for_reasons: Vec<String>,
}

impl OperatorOverride {
    fn applies_to(&self, cause: FailCause, reason: Option<&str>) -> bool {
        if self.cause != cause {
            return false;
        }
        if self.only_for_reasons.is_empty() {
            return true;
        }
        match reason {
            Some(r) => self.only_for_reasons.iter().any(|allowed| allowed == r),
            None => false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OperatorOverrides {
    entries: Vec<OperatorOverride>,
}

impl OperatorOverrides {
    pub fn new(entries: Vec<OperatorOverride>) -> Self {
        Self { entries }
    }

    pub fn lookup(&self, cause: FailCause, reason: Option<&str>) -> Option<&OperatorOverride> {
        self.entries.iter().find(|o| o.applies_to(cause, reason))
    }

    /// Any entry for `cause` flagged to survive service changes, whatever its reason filter.
    pub fn is_sticky(&self, cause: FailCause) -> bool {
        self.entries
            .iter()
            .any(|o| o.cause == cause && o.survives_service_change)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
