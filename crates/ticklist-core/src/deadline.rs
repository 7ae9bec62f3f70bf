//! Time arithmetic behind deadline badges and progress bars, plus the
//! grammar accepted by the deadline prompt. Everything here is pure.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use thiserror::Error;

const MINUTES_PER_HOUR: i64 = 60;
const MINUTES_PER_DAY: i64 = 24 * MINUTES_PER_HOUR;

/// Upper bound for a deadline offset (roughly a century).
pub const MAX_DEADLINE_MINUTES: u64 = 100 * 365 * MINUTES_PER_DAY as u64;

pub const EXPIRED_LABEL: &str = "expired";

/// Hint shown by the deadline prompt.
pub const INPUT_HINT: &str =
    "Deadline from now: 30 = 30 minutes, 2h = 2 hours, 1d = 1 day (0 clears the deadline)";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationParseError {
    #[error("no duration entered")]
    Empty,
    #[error("duration cannot be negative")]
    Negative,
    #[error("not a duration: {0}")]
    Invalid(String),
    #[error("unknown time unit '{0}'")]
    UnknownUnit(String),
    #[error("duration is too large")]
    TooLarge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressState {
    OnTrack,
    NearDue,
    Expired,
}

/// Whole minutes until `deadline`, rounded toward negative infinity.
pub fn remaining_minutes(deadline: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (deadline - now).num_milliseconds().div_euclid(60_000)
}

pub fn format_remaining(minutes: i64) -> String {
    if minutes <= 0 {
        return EXPIRED_LABEL.to_string();
    }

    let days = minutes / MINUTES_PER_DAY;
    let hours = (minutes % MINUTES_PER_DAY) / MINUTES_PER_HOUR;
    let mins = minutes % MINUTES_PER_HOUR;

    if days > 0 {
        format!("{days}d {hours}h")
    } else if hours > 0 {
        format!("{hours}h {mins}m")
    } else {
        format!("{mins}m")
    }
}

/// Share of the deadline window already elapsed, 0..=100.
pub fn progress_percent(
    deadline: Option<DateTime<Utc>>,
    deadline_set_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> u8 {
    let (Some(deadline), Some(start)) = (deadline, deadline_set_at) else {
        return 0;
    };

    let total = (deadline - start).num_milliseconds();
    let elapsed = (now - start).num_milliseconds();

    if total <= 0 {
        return 100;
    }
    if elapsed <= 0 {
        return 0;
    }
    if elapsed >= total {
        return 100;
    }

    let pct = (elapsed as f64 / total as f64 * 100.0).round();
    pct.clamp(0.0, 100.0) as u8
}

pub fn progress_state(percent: u8) -> ProgressState {
    if percent >= 100 {
        ProgressState::Expired
    } else if percent >= 80 {
        ProgressState::NearDue
    } else {
        ProgressState::OnTrack
    }
}

fn duration_re() -> Option<&'static Regex> {
    static DURATION_RE: OnceLock<Option<Regex>> = OnceLock::new();
    DURATION_RE
        .get_or_init(|| Regex::new(r"^(?P<num>[0-9]+)\s*(?P<unit>[^0-9]*)$").ok())
        .as_ref()
}

/// Parses deadline input into minutes. `Ok(0)` means "clear the deadline".
pub fn parse_duration_input(raw: &str) -> Result<u64, DurationParseError> {
    let input = raw.trim();
    if input.is_empty() {
        return Err(DurationParseError::Empty);
    }
    if input.starts_with('-') {
        return Err(DurationParseError::Negative);
    }

    let re = duration_re().ok_or_else(|| DurationParseError::Invalid(input.to_string()))?;
    let caps = re
        .captures(input)
        .ok_or_else(|| DurationParseError::Invalid(input.to_string()))?;

    let num: u64 = caps
        .name("num")
        .map(|m| m.as_str())
        .unwrap_or_default()
        .parse()
        .map_err(|_| DurationParseError::TooLarge)?;
    let unit = caps
        .name("unit")
        .map(|m| m.as_str().trim().to_lowercase())
        .unwrap_or_default();

    let factor = match unit.as_str() {
        "" | "m" | "min" | "mins" | "minute" | "minutes" | "分钟" => 1,
        "h" | "hr" | "hrs" | "hour" | "hours" | "小时" => MINUTES_PER_HOUR as u64,
        "d" | "day" | "days" | "天" => MINUTES_PER_DAY as u64,
        other => return Err(DurationParseError::UnknownUnit(other.to_string())),
    };

    let minutes = num
        .checked_mul(factor)
        .ok_or(DurationParseError::TooLarge)?;
    if minutes > MAX_DEADLINE_MINUTES {
        return Err(DurationParseError::TooLarge);
    }
    Ok(minutes)
}
