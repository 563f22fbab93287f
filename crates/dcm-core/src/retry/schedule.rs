//! Backoff schedule grammar.
//!
//! A schedule is a comma-separated list of tokens:
//!
//! - `max_retries=N` or `max_retries=infinite`
//! - `default_randomization=R`: jitter window (ms) for the first slot
//! - `D`, `D:R`, `D*N`, `D:R*N`: a delay slot in ms, with an optional
//!   per-slot jitter window and an optional repeat count
//!
//! Without `max_retries` the retry bound is the number of expanded slots.
//! Expansion stops at [`MAX_SLOTS`]; longer schedules are rejected.

use crate::error::ScheduleError;
use std::str::FromStr;
use std::time::Duration;

/// Upper bound on expanded slots.
pub const MAX_SLOTS: usize = 1024;

/// One backoff step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub delay: Duration,
    /// Upper bound of the uniform jitter added to `delay`; zero for none.
    pub randomization: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Schedule {
    pub slots: Vec<Slot>,
    /// Explicit bound from `max_retries=N`.
    pub max_retries: Option<u32>,
    pub retry_forever: bool,
    pub default_randomization: Duration,
}

impl Schedule {
    /// Single-slot schedule, used for the hardcoded fallbacks.
    pub fn fixed(max_retries: u32, delay_ms: u64, randomization_ms: u64) -> Self {
        Self {
            slots: vec![Slot {
                delay: Duration::from_millis(delay_ms),
                randomization: Duration::from_millis(randomization_ms),
            }],
            max_retries: Some(max_retries),
            retry_forever: false,
            default_randomization: Duration::ZERO,
        }
    }

    /// Effective retry bound.
    pub fn retry_bound(&self) -> u32 {
        self.max_retries
            .unwrap_or_else(|| u32::try_from(self.slots.len()).unwrap_or(u32::MAX))
    }

    /// Jitter window applying to slot `idx`.
    pub fn randomization_for(&self, idx: usize) -> Duration {
        let slot = self.slots.get(idx).map(|s| s.randomization).unwrap_or_default();
        if slot.is_zero() && idx == 0 {
            self.default_randomization
        } else {
            slot
        }
    }
}

fn millis(raw: &str) -> Result<u64, ScheduleError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| ScheduleError::BadNumber(raw.trim().to_string()))
}

fn parse_slot(token: &str) -> Result<(Slot, u32), ScheduleError> {
    let (body, repeat) = match token.split_once('*') {
        Some((body, n)) => {
            let n = u32::try_from(millis(n)?)
                .map_err(|_| ScheduleError::BadNumber(n.trim().to_string()))?;
            if n == 0 {
                return Err(ScheduleError::ZeroRepeat(token.to_string()));
            }
            (body, n)
        }
        None => (token, 1),
    };
    let (delay, randomization) = match body.split_once(':') {
        Some((d, r)) => (millis(d)?, millis(r)?),
        None => (millis(body)?, 0),
    };
    let slot = Slot {
        delay: Duration::from_millis(delay),
        randomization: Duration::from_millis(randomization),
    };
    Ok((slot, repeat))
}

impl FromStr for Schedule {
    type Err = ScheduleError;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        if spec.trim().is_empty() {
            return Err(ScheduleError::Empty);
        }
        let mut out = Schedule::default();
        for token in spec.split(',').map(str::trim) {
            if let Some((key, value)) = token.split_once('=') {
                match key.trim() {
                    "max_retries" if value.trim() == "infinite" => out.retry_forever = true,
                    "max_retries" => {
                        let n = millis(value)?;
                        out.max_retries = Some(
                            u32::try_from(n).map_err(|_| ScheduleError::BadNumber(n.to_string()))?,
                        );
                    }
                    "default_randomization" => {
                        out.default_randomization = Duration::from_millis(millis(value)?);
                    }
                    other => return Err(ScheduleError::UnknownKey(other.to_string())),
                }
                continue;
            }
            let (slot, repeat) = parse_slot(token)?;
            let repeat = repeat as usize;
            if repeat > MAX_SLOTS - out.slots.len() {
                return Err(ScheduleError::TooLong(MAX_SLOTS));
            }
            out.slots.extend(std::iter::repeat(slot).take(repeat));
        }
        if out.slots.is_empty() {
            if out.max_retries.is_none() && !out.retry_forever {
                return Err(ScheduleError::Empty);
            }
            out.slots.push(Slot {
                delay: Duration::ZERO,
                randomization: Duration::ZERO,
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn plain_list_bounds_by_slot_count() {
        let s: Schedule = "1000,2000,4000".parse().unwrap();
        assert_eq!(s.slots.len(), 3);
        assert_eq!(s.retry_bound(), 3);
        assert_eq!(s.slots[2].delay, ms(4000));
    }

    #[test]
    fn max_retries_and_repeat() {
        let s: Schedule = "max_retries=10, 5000*3, 8000:1000".parse().unwrap();
        assert_eq!(s.retry_bound(), 10);
        assert_eq!(s.slots.len(), 4);
        assert_eq!(s.slots[3].randomization, ms(1000));
    }

    #[test]
    fn default_randomization_hits_first_slot_only() {
        let s: Schedule = "default_randomization=2000,5000,10000".parse().unwrap();
        assert_eq!(s.randomization_for(0), ms(2000));
        assert_eq!(s.randomization_for(1), Duration::ZERO);
    }

    #[test]
    fn infinite_sets_forever() {
        let s: Schedule = "max_retries=infinite,1000".parse().unwrap();
        assert!(s.retry_forever);
    }

    #[test]
    fn shipped_default_parses() {
        let s: Schedule = "default_randomization=2000,5000,10000,20000,40000,80000:5000,\
                           160000:5000,320000:5000,640000:5000,1280000:5000,1800000:5000"
            .parse()
            .unwrap();
        assert_eq!(s.retry_bound(), 10);
        assert_eq!(s.slots[0].delay, ms(5000));
        assert_eq!(s.randomization_for(0), ms(2000));
        assert_eq!(s.slots[9].delay, ms(1_800_000));
    }

    #[test]
    fn malformed_specs_rejected() {
        assert_eq!("".parse::<Schedule>(), Err(ScheduleError::Empty));
        assert!(matches!("1000,abc".parse::<Schedule>(), Err(ScheduleError::BadNumber(_))));
        assert!(matches!("1000,-5".parse::<Schedule>(), Err(ScheduleError::BadNumber(_))));
        assert!(matches!("retries=3".parse::<Schedule>(), Err(ScheduleError::UnknownKey(_))));
        assert!(matches!("1000*0".parse::<Schedule>(), Err(ScheduleError::ZeroRepeat(_))));
        assert!(matches!("1000,,2000".parse::<Schedule>(), Err(ScheduleError::BadNumber(_))));
    }

    #[test]
    fn huge_repeat_is_rejected_before_expansion() {
        assert_eq!(
            "1000*4000000000".parse::<Schedule>(),
            Err(ScheduleError::TooLong(MAX_SLOTS))
        );
        assert_eq!(
            "500*1000,1000*100".parse::<Schedule>(),
            Err(ScheduleError::TooLong(MAX_SLOTS))
        );
        let s: Schedule = format!("1000*{}", MAX_SLOTS).parse().unwrap();
        assert_eq!(s.slots.len(), MAX_SLOTS);
    }
}
