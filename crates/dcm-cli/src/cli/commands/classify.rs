//! `dcm classify` – show the disposition of a failure cause.

use anyhow::{anyhow, Result};
use dcm_core::classify::{DefaultClassifier, FailCause, FailureClassifier, FailureDisposition};
use dcm_core::config::DcmConfig;
use dcm_core::retry::RetryPolicy;

pub(crate) fn classify(
    cfg: &DcmConfig,
    cause: FailCause,
    attempts: u32,
    reason: Option<&str>,
    schedule: Option<&str>,
) -> Result<FailureDisposition> {
    let spec = schedule.unwrap_or(&cfg.retry.default_schedule);
    let mut policy = RetryPolicy::default();
    if !policy.configure(spec) {
        return Err(anyhow!("invalid schedule '{spec}'"));
    }
    policy.set_attempts(attempts);
    let classifier = DefaultClassifier::from_config(&cfg.classifier);
    Ok(classifier.classify(cause, &policy, reason))
}

pub(crate) fn describe(d: FailureDisposition) -> String {
    match d {
        FailureDisposition::Retry {
            delay: Some(delay),
            precision,
        } => format!("retry after {} ms ({:?} alarm)", delay.as_millis(), precision).to_lowercase(),
        FailureDisposition::Retry {
            delay: None,
            precision,
        } => format!("retry on the policy's schedule ({:?} alarm)", precision).to_lowercase(),
        FailureDisposition::RestartTransport => "restart the radio stack".to_string(),
        FailureDisposition::Permanent => "permanent: fail the request".to_string(),
        FailureDisposition::PartialSuccess => {
            "partial success: keep the granted family, retry the other".to_string()
        }
    }
}

pub fn run_classify(
    cfg: &DcmConfig,
    cause: &str,
    attempts: u32,
    reason: Option<&str>,
    schedule: Option<&str>,
) -> Result<()> {
    let cause: FailCause = cause.parse().map_err(|e: String| anyhow!(e))?;
    let disposition = classify(cfg, cause, attempts, reason, schedule)?;
    let classifier = DefaultClassifier::from_config(&cfg.classifier);

    println!("cause:        {} ({:#x})", cause, cause.code());
    println!("disposition:  {}", describe(disposition));
    println!(
        "service change: {}",
        if classifier.survives_service_change(cause) {
            "keeps retrying"
        } else {
            "gives up"
        }
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcm_core::classify::OperatorOverride;
    use dcm_core::transport::AlarmPrecision;
    use std::time::Duration;

    #[test]
    fn transient_cause_retries_on_schedule() {
        let cfg = DcmConfig::default();
        let d = classify(&cfg, FailCause::SignalLost, 0, None, Some("max_retries=2,1500")).unwrap();
        assert_eq!(
            d,
            FailureDisposition::Retry {
                delay: Some(Duration::from_millis(1500)),
                precision: AlarmPrecision::Approximate,
            }
        );
    }

    #[test]
    fn exhausted_budget_is_permanent() {
        let cfg = DcmConfig::default();
        let d = classify(&cfg, FailCause::SignalLost, 2, None, Some("max_retries=2,1500")).unwrap();
        assert_eq!(d, FailureDisposition::Permanent);
    }

    #[test]
    fn operator_override_sets_exact_delay() {
        let mut cfg = DcmConfig::default();
        cfg.classifier.overrides.push(OperatorOverride {
            cause: FailCause::InsufficientResources,
            precision: AlarmPrecision::Exact,
            delay_ms: Some(720_000),
            survives_service_change: true,
            only_for_reasons: vec![],
        });
        let d = classify(&cfg, FailCause::InsufficientResources, 0, None, None).unwrap();
        assert_eq!(
            d,
            FailureDisposition::Retry {
                delay: Some(Duration::from_millis(720_000)),
                precision: AlarmPrecision::Exact,
            }
        );
        assert_eq!(describe(d), "retry after 720000 ms (exact alarm)");
    }

    #[test]
    fn bad_schedule_is_reported() {
        let cfg = DcmConfig::default();
        assert!(classify(&cfg, FailCause::SignalLost, 0, None, Some("nope")).is_err());
    }

    #[test]
    fn unknown_cause_name_is_rejected() {
        let cfg = DcmConfig::default();
        assert!(run_classify(&cfg, "not-a-cause", 0, None, None).is_err());
    }
}
