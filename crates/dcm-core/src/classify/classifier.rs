use super::operator::OperatorOverrides;
use super::FailCause;
use crate::config::ClassifierConfig;
use crate::retry::RetryPolicy;
use crate::transport::AlarmPrecision;
use std::fmt;
use std::time::Duration;

/// Outcome of classifying a failure cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    /// Retry after `delay`; `None` leaves the choice to the retry policy.
    Retry {
        delay: Option<Duration>,
        precision: AlarmPrecision,
    },
    /// The radio stack must be restarted; the request fails.
    RestartTransport,
    Permanent,
    /// One address family was granted: the bearer is usable, a narrower
    /// retry may continue in the background.
    PartialSuccess,
}

/// Maps a failure cause to a disposition.
///
/// Implementations may read the retry policy but never mutate it.
pub trait FailureClassifier: Send + Sync + fmt::Debug {
    fn classify(
        &self,
        cause: FailCause,
        policy: &RetryPolicy,
        reason: Option<&str>,
    ) -> FailureDisposition;

    /// Causes whose retries continue across RAT or registration changes.
    fn survives_service_change(&self, _cause: FailCause) -> bool {
        false
    }
}

/// Built-in rules plus an operator override table.
///
/// Precedence: restart-transport causes, permanent causes, partial
/// address-family causes, operator overrides, then plain backoff while
/// attempts remain.
#[derive(Debug, Clone, Default)]
pub struct DefaultClassifier {
    restart_on_regular_deactivation: bool,
    overrides: OperatorOverrides,
}

impl DefaultClassifier {
    pub fn new(restart_on_regular_deactivation: bool, overrides: OperatorOverrides) -> Self {
        Self {
            restart_on_regular_deactivation,
            overrides,
        }
    }

    pub fn from_config(cfg: &ClassifierConfig) -> Self {
        Self::new(
            cfg.restart_on_regular_deactivation,
            OperatorOverrides::new(cfg.overrides.clone()),
        )
    }

    fn needs_restart(&self, cause: FailCause) -> bool {
        self.restart_on_regular_deactivation && cause == FailCause::RegularDeactivation
    }
}

impl FailureClassifier for DefaultClassifier {
    fn classify(
        &self,
        cause: FailCause,
        policy: &RetryPolicy,
        reason: Option<&str>,
    ) -> FailureDisposition {
        if self.needs_restart(cause) {
            return FailureDisposition::RestartTransport;
        }
        if cause.is_permanent() {
            return FailureDisposition::Permanent;
        }
        if cause.is_partial_family() {
            return FailureDisposition::PartialSuccess;
        }
        if let Some(o) = self.overrides.lookup(cause, reason) {
            if !policy.has_remaining() {
                return FailureDisposition::Permanent;
            }
            let delay = o.delay_ms.map(Duration::from_millis).or_else(|| policy.next_delay());
            return FailureDisposition::Retry {
                delay,
                precision: o.precision,
            };
        }
        match policy.next_delay() {
            Some(d) => FailureDisposition::Retry {
                delay: Some(d),
                precision: AlarmPrecision::Approximate,
            },
            None => FailureDisposition::Permanent,
        }
    }

    fn survives_service_change(&self, cause: FailCause) -> bool {
        cause.is_partial_family() || self.overrides.is_sticky(cause)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::OperatorOverride;

    fn policy(spec: &str) -> RetryPolicy {
        let mut p = RetryPolicy::default();
        assert!(p.configure(spec));
        p
    }

    fn retry_after(ms: u64) -> FailureDisposition {
        FailureDisposition::Retry {
            delay: Some(Duration::from_millis(ms)),
            precision: AlarmPrecision::Approximate,
        }
    }

    #[test]
    fn restart_beats_everything() {
        let c = DefaultClassifier::new(true, OperatorOverrides::default());
        let p = policy("1000");
        assert_eq!(
            c.classify(FailCause::RegularDeactivation, &p, None),
            FailureDisposition::RestartTransport
        );
        let plain = DefaultClassifier::default();
        assert_eq!(
            plain.classify(FailCause::RegularDeactivation, &p, None),
            retry_after(1000)
        );
    }

    #[test]
    fn permanent_even_with_attempts_left() {
        let c = DefaultClassifier::default();
        let p = policy("max_retries=10,1000");
        assert_eq!(
            c.classify(FailCause::UserAuthentication, &p, None),
            FailureDisposition::Permanent
        );
    }

    #[test]
    fn partial_family_is_partial_success() {
        let c = DefaultClassifier::default();
        let mut p = policy("1000");
        p.record_attempt();
        assert_eq!(
            c.classify(FailCause::OnlyIpv4Allowed, &p, None),
            FailureDisposition::PartialSuccess
        );
        assert!(c.survives_service_change(FailCause::OnlyIpv6Allowed));
        assert!(!c.survives_service_change(FailCause::SignalLost));
    }

    #[test]
    fn backoff_until_exhausted() {
        let c = DefaultClassifier::default();
        let mut p = policy("max_retries=3,1000,2000,4000");
        let mut out = Vec::new();
        for _ in 0..4 {
            out.push(c.classify(FailCause::SignalLost, &p, None));
            p.record_attempt();
        }
        assert_eq!(
            out,
            vec![
                retry_after(1000),
                retry_after(2000),
                retry_after(4000),
                FailureDisposition::Permanent
            ]
        );
    }

    #[test]
    fn classify_does_not_touch_attempts() {
        let c = DefaultClassifier::default();
        let p = policy("1000,2000");
        let _ = c.classify(FailCause::SignalLost, &p, None);
        assert_eq!(p.attempts(), 0);
    }

    #[test]
    fn operator_override_uses_exact_timer() {
        let overrides = OperatorOverrides::new(vec![OperatorOverride {
            cause: FailCause::InsufficientResources,
            precision: AlarmPrecision::Exact,
            delay_ms: Some(720_000),
            survives_service_change: true,
            only_for_reasons: Vec::new(),
        }]);
        let c = DefaultClassifier::new(false, overrides);
        let mut p = policy("max_retries=2,1000");
        assert_eq!(
            c.classify(FailCause::InsufficientResources, &p, Some("attach")),
            FailureDisposition::Retry {
                delay: Some(Duration::from_millis(720_000)),
                precision: AlarmPrecision::Exact,
            }
        );
        assert!(c.survives_service_change(FailCause::InsufficientResources));
        p.set_attempts(2);
        assert_eq!(
            c.classify(FailCause::InsufficientResources, &p, None),
            FailureDisposition::Permanent
        );
    }
}
