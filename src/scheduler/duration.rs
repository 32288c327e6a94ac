//! Session length and per-thread fan-out.

use serde::{Deserialize, Serialize};

use crate::settings::DoomscrollConfig;

use super::SchedulerError;

pub const MIN_THROTTLE_LEVEL: u8 = 1;
pub const MAX_THROTTLE_LEVEL: u8 = 9;
pub const MIN_THREAD_COUNT: u8 = 1;
pub const MAX_THREAD_COUNT: u8 = 8;

const MS_PER_MINUTE: f64 = 60_000.0;

/// User-chosen intensity, always within `1..=9`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThrottleLevel(u8);

impl ThrottleLevel {
    pub fn clamped(level: u8) -> Self {
        Self(level.clamp(MIN_THROTTLE_LEVEL, MAX_THROTTLE_LEVEL))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for ThrottleLevel {
    fn default() -> Self {
        Self(5)
    }
}

/// Number of simulated consumption threads, always within `1..=8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadCount(u8);

impl ThreadCount {
    pub fn clamped(count: u8) -> Self {
        Self(count.clamp(MIN_THREAD_COUNT, MAX_THREAD_COUNT))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for ThreadCount {
    fn default() -> Self {
        Self(MIN_THREAD_COUNT)
    }
}

/// Total session length: `min + multiplier * (level - 1) / divisor` minutes.
pub fn session_duration_ms(level: ThrottleLevel, config: &DoomscrollConfig) -> u64 {
    let steps = f64::from(level.get() - MIN_THROTTLE_LEVEL);
    let minutes = config.min_minutes + config.multiplier * steps / config.divisor;
    (minutes * MS_PER_MINUTE).round() as u64
}

/// Splits one budget into a staggered schedule running from half the budget
/// (first thread) up to the full budget (last thread).
pub fn thread_durations(total_ms: u64, thread_count: usize) -> Result<Vec<u64>, SchedulerError> {
    match thread_count {
        0 => Err(SchedulerError::InvalidThreadCount(thread_count)),
        1 => Ok(vec![total_ms]),
        n => {
            let half = total_ms as f64 / 2.0;
            let step = half / (n - 1) as f64;
            Ok((0..n)
                .map(|i| (half + i as f64 * step).round() as u64)
                .collect())
        }
    }
}

/// Budget in minutes handed to the backend for a thread that ran `duration_ms`.
pub fn budget_minutes(duration_ms: u64) -> f64 {
    duration_ms as f64 / MS_PER_MINUTE
}
