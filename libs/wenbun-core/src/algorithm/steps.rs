//! Learning-step parsing ("1m", "10m", "1h", "5d").

use chrono::Duration;

use super::fsrs::DEFAULT_MAXIMUM_INTERVAL;
use crate::error::{CoreError, Result};

/// No step may exceed the longest review interval.
const MAX_STEP_SECONDS: i64 = DEFAULT_MAXIMUM_INTERVAL as i64 * 86_400;

/// Parse a single step such as `"10m"`.
pub fn parse_step(step: &str) -> Result<Duration> {
    let step = step.trim();
    let invalid = || CoreError::InvalidLearningStep(step.to_string());

    let unit = step.chars().last().ok_or_else(invalid)?;
    let amount: i64 = step[..step.len() - unit.len_utf8()]
        .parse()
        .map_err(|_| invalid())?;
    if amount <= 0 {
        return Err(invalid());
    }

    let unit_seconds: i64 = match unit {
        's' => 1,
        'm' => 60,
        'h' => 3_600,
        'd' => 86_400,
        _ => return Err(invalid()),
    };
    amount
        .checked_mul(unit_seconds)
        .filter(|&seconds| seconds <= MAX_STEP_SECONDS)
        .and_then(Duration::try_seconds)
        .ok_or_else(invalid)
}

pub fn parse_steps(steps: &[String]) -> Result<Vec<Duration>> {
    steps.iter().map(|s| parse_step(s)).collect()
}
