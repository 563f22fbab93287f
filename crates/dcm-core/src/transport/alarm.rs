use crate::config::AlarmConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

pub type AlarmFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// How strictly an alarm must fire at its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlarmPrecision {
    /// Fire at the deadline (network-mandated back-off timers).
    Exact,
    /// May be deferred to batch with other wakeups.
    #[default]
    Approximate,
}

/// Timer facility. The returned future completes when the alarm fires;
/// there is no cancel path, callers drop stale firings by tag.
pub trait AlarmScheduler: Send + Sync + fmt::Debug {
    fn sleep(&self, delay: Duration, precision: AlarmPrecision) -> AlarmFuture;
}

/// Alarms on the tokio timer wheel.
#[derive(Debug, Clone, Default)]
pub struct TokioAlarms {
    slack: Duration,
}

impl TokioAlarms {
    pub fn new(slack: Duration) -> Self {
        Self { slack }
    }

    pub fn from_config(cfg: &AlarmConfig) -> Self {
        Self::new(Duration::from_millis(cfg.approximate_slack_ms))
    }

    /// Approximate alarms round up to the next multiple of the slack window.
    pub fn effective_delay(&self, delay: Duration, precision: AlarmPrecision) -> Duration {
        let slack = self.slack.as_millis();
        if precision == AlarmPrecision::Exact || slack == 0 {
            return delay;
        }
        let ms = delay.as_millis();
        let rounded = ms.div_ceil(slack) * slack;
        Duration::from_millis(u64::try_from(rounded).unwrap_or(u64::MAX))
    }
}

impl AlarmScheduler for TokioAlarms {
    fn sleep(&self, delay: Duration, precision: AlarmPrecision) -> AlarmFuture {
        let delay = self.effective_delay(delay, precision);
        Box::pin(tokio::time::sleep(delay))
    }
}
