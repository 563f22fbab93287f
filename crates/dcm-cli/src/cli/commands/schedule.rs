//! `dcm schedule` – print the delay before each retry.

use anyhow::{Context, Result};
use dcm_core::retry::Schedule;
use std::time::Duration;

/// Attempts shown for `max_retries=infinite` when `--attempts` is not given.
const FOREVER_PREVIEW: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Row {
    pub attempt: u32,
    /// `None` once the retry bound is reached.
    pub delay: Option<Duration>,
    pub jitter: Duration,
}

pub(crate) fn rows(schedule: &Schedule, attempts: Option<u32>) -> Vec<Row> {
    let bound = schedule.retry_bound();
    let shown = attempts.unwrap_or(if schedule.retry_forever {
        FOREVER_PREVIEW
    } else {
        bound.saturating_add(1)
    });
    let last = schedule.slots.len().saturating_sub(1);
    (0..shown)
        .map(|attempt| {
            let idx = (attempt as usize).min(last);
            if !schedule.retry_forever && attempt >= bound {
                return Row {
                    attempt,
                    delay: None,
                    jitter: Duration::ZERO,
                };
            }
            Row {
                attempt,
                delay: schedule.slots.get(idx).map(|s| s.delay),
                jitter: schedule.randomization_for(idx),
            }
        })
        .collect()
}

pub fn run_schedule(spec: &str, attempts: Option<u32>) -> Result<()> {
    let schedule: Schedule = spec
        .parse()
        .with_context(|| format!("invalid schedule '{spec}'"))?;
    if schedule.retry_forever {
        println!("retries: infinite");
    } else {
        println!("retries: {}", schedule.retry_bound());
    }
    println!("{:<8} {:<12} {}", "ATTEMPT", "DELAY_MS", "JITTER_MS");
    for row in rows(&schedule, attempts) {
        match row.delay {
            Some(d) => println!(
                "{:<8} {:<12} {}",
                row.attempt,
                d.as_millis(),
                row.jitter.as_millis()
            ),
            None => println!("{:<8} {:<12} -", row.attempt, "give-up"),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Option<Duration> {
        Some(Duration::from_millis(v))
    }

    #[test]
    fn bounded_schedule_ends_with_give_up() {
        let s: Schedule = "max_retries=3,1000,2000:500".parse().unwrap();
        let r = rows(&s, None);
        assert_eq!(r.len(), 4);
        assert_eq!(r[0].delay, ms(1000));
        assert_eq!(r[1].delay, ms(2000));
        assert_eq!(r[1].jitter, Duration::from_millis(500));
        assert_eq!(r[2].delay, ms(2000));
        assert_eq!(r[3].delay, None);
    }

    #[test]
    fn infinite_schedule_is_previewed() {
        let s: Schedule = "max_retries=infinite,100".parse().unwrap();
        let r = rows(&s, None);
        assert_eq!(r.len(), FOREVER_PREVIEW as usize);
        assert!(r.iter().all(|row| row.delay == ms(100)));
    }

    #[test]
    fn default_randomization_applies_to_first_slot() {
        let s: Schedule = "default_randomization=300,1000,2000".parse().unwrap();
        let r = rows(&s, Some(2));
        assert_eq!(r[0].jitter, Duration::from_millis(300));
        assert_eq!(r[1].jitter, Duration::ZERO);
    }

    #[test]
    fn malformed_schedule_is_an_error() {
        assert!(run_schedule("1000,abc", None).is_err());
    }
}
