use super::schedule::Schedule;
use rand::Rng;
use std::time::Duration;

/// Backoff schedule plus the mutable retry counters of one connection.
///
/// Pure bookkeeping: it never sleeps or schedules anything. The owner asks
/// for `next_delay()` after a failure and calls `record_attempt()` when the
/// retry actually goes out.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    schedule: Schedule,
    /// Bound from the schedule; `current_max` returns here on `restore_max`.
    max_retries: u32,
    /// Effective bound, possibly overridden for an initial bring-up.
    current_max: u32,
    attempts: u32,
    retry_forever: bool,
}

impl Default for RetryPolicy {
    /// A policy that never retries.
    fn default() -> Self {
        Self::from_schedule(Schedule::fixed(0, 0, 0))
    }
}

impl RetryPolicy {
    pub fn from_schedule(schedule: Schedule) -> Self {
        let max = schedule.retry_bound();
        Self {
            retry_forever: schedule.retry_forever,
            schedule,
            max_retries: max,
            current_max: max,
            attempts: 0,
        }
    }

    /// Replace the schedule from its string form. Returns false and leaves
    /// the policy untouched when `spec` is malformed.
    pub fn configure(&mut self, spec: &str) -> bool {
        match spec.parse::<Schedule>() {
            Ok(schedule) => {
                *self = Self::from_schedule(schedule);
                true
            }
            Err(e) => {
                tracing::debug!("retry schedule '{}' rejected: {}", spec, e);
                false
            }
        }
    }

    /// Single-slot schedule with an explicit bound.
    pub fn configure_fixed(&mut self, max_retries: u32, delay_ms: u64, randomization_ms: u64) {
        *self = Self::from_schedule(Schedule::fixed(max_retries, delay_ms, randomization_ms));
    }

    /// Delay before the next retry, or `None` when the bound is reached.
    ///
    /// Past the end of the schedule the last slot repeats.
    pub fn next_delay(&self) -> Option<Duration> {
        if !self.has_remaining() {
            return None;
        }
        let last = self.schedule.slots.len().saturating_sub(1);
        let idx = (self.attempts as usize).min(last);
        let base = self
            .schedule
            .slots
            .get(idx)
            .map(|s| s.delay)
            .unwrap_or_default();
        let window = self.schedule.randomization_for(idx);
        if window.is_zero() {
            return Some(base);
        }
        let jitter = rand::thread_rng().gen_range(0..=window.as_millis() as u64);
        Some(base + Duration::from_millis(jitter))
    }

    pub fn has_remaining(&self) -> bool {
        self.retry_forever || self.attempts < self.current_max
    }

    pub fn record_attempt(&mut self) {
        self.attempts = self.attempts.saturating_add(1);
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn set_attempts(&mut self, n: u32) {
        self.attempts = n;
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn current_max(&self) -> u32 {
        self.current_max
    }

    /// Temporarily override the bound (e.g. a request's initial budget).
    pub fn set_current_max(&mut self, n: u32) {
        self.current_max = n;
    }

    pub fn restore_max(&mut self) {
        self.current_max = self.max_retries;
    }

    pub fn set_retry_forever(&mut self, forever: bool) {
        self.retry_forever = forever;
    }

    pub fn retry_forever(&self) -> bool {
        self.retry_forever
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }
}
