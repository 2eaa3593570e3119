//! Job schedules and the responsibility-interval calculation.
//!
//! A run fired at `t(i)` owns `[t(i), t(i+1))`, where `t(i+1)` is the next
//! firing of the same schedule. The next firing is always derived from the
//! schedule definition, so a monthly job owns a 28, 29, 30 or 31 day window
//! depending on the month it fired in.
//!
//! # Supported formats
//!
//! | Format | Syntax | Example |
//! |--------|--------|---------|
//! | Standard cron | `min hour dom month dow` | `0 0 7 * *` |
//! | Cron with seconds | `sec min hour dom month dow [year]` | `0 30 9 * * Mon-Fri` |
//! | Prefixed cron | `cron:<expr>` | `cron:1 0 * * *` |
//! | Named | `@name` | `@daily`, `@weekly`, `@monthly` |
//! | Fixed delta | `every:<n><unit>` | `every:6h`, `every:2d` |
//! | Manual | `@once`, `@none`, `manual` | |

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{DataInterval, ScheduleError};

/// Maximum schedule string length accepted by the parser.
const MAX_SCHEDULE_STRING_LENGTH: usize = 256;

/// How often a job fires.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Cadence {
    /// Calendar-aware cron schedule. `source` is the expression as written.
    Cron {
        source: String,
        schedule: Box<cron::Schedule>,
    },
    /// Fires every fixed delta after the previous firing.
    Every(Duration),
    /// Triggered by hand only; has no next firing.
    Manual,
}

impl Cadence {
    /// The first firing strictly after `t`, if the cadence has one.
    pub fn next_after(&self, t: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Cron { schedule, .. } => schedule.after(&t).next(),
            Self::Every(delta) => t.checked_add_signed(*delta),
            Self::Manual => None,
        }
    }
}

impl PartialEq for Cadence {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Cron { source: a, .. }, Self::Cron { source: b, .. }) => a == b,
            (Self::Every(a), Self::Every(b)) => a == b,
            (Self::Manual, Self::Manual) => true,
            _ => false,
        }
    }
}

impl Eq for Cadence {}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cron { source, .. } => f.write_str(source),
            Self::Every(delta) => write!(f, "every:{}", format_delta(*delta)),
            Self::Manual => f.write_str("@once"),
        }
    }
}

impl FromStr for Cadence {
    type Err = ScheduleError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let input = input.trim();
        let invalid = |reason: &str| ScheduleError::InvalidExpression {
            expr: input.to_string(),
            reason: reason.to_string(),
        };

        if input.is_empty() {
            return Err(invalid("schedule cannot be empty"));
        }
        if input.len() > MAX_SCHEDULE_STRING_LENGTH {
            return Err(invalid("schedule string too long"));
        }

        match input {
            "@once" | "@none" | "manual" => return Ok(Self::Manual),
            "@hourly" => return cron_cadence(input, "0 0 * * * *"),
            "@daily" | "@midnight" => return cron_cadence(input, "0 0 0 * * *"),
            "@weekly" => return cron_cadence(input, "0 0 0 * * Sun"),
            "@monthly" => return cron_cadence(input, "0 0 0 1 * *"),
            "@yearly" | "@annually" => return cron_cadence(input, "0 0 0 1 1 *"),
            _ => {}
        }

        if input.starts_with('@') {
            return Err(invalid("unknown named schedule"));
        }

        if let Some(delta) = input.strip_prefix("every:") {
            return parse_delta(delta.trim())
                .map(Self::Every)
                .ok_or_else(|| invalid("expected a positive duration such as 30m, 6h or 2d"));
        }

        let expr = input.strip_prefix("cron:").unwrap_or(input).trim();
        let fields: Vec<&str> = expr.split_whitespace().collect();
        let normalized = match fields.len() {
            5 => {
                let dow = translate_day_of_week(fields[4]).map_err(|reason| invalid(&reason))?;
                format!("0 {} {} {} {} {}", fields[0], fields[1], fields[2], fields[3], dow)
            }
            6 | 7 => fields.join(" "),
            0 => return Err(invalid("cron expression cannot be empty")),
            _ => return Err(invalid("expected 5, 6 or 7 cron fields")),
        };

        cron_cadence(input, &normalized)
    }
}

impl TryFrom<String> for Cadence {
    type Error = ScheduleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Cadence> for String {
    fn from(cadence: Cadence) -> Self {
        cadence.to_string()
    }
}

fn cron_cadence(source: &str, expr: &str) -> Result<Cadence, ScheduleError> {
    let schedule =
        cron::Schedule::from_str(expr).map_err(|e| ScheduleError::InvalidExpression {
            expr: source.to_string(),
            reason: e.to_string(),
        })?;
    Ok(Cadence::Cron {
        source: source.to_string(),
        schedule: Box::new(schedule),
    })
}

/// Map a standard cron day-of-week field (0-7, 0 and 7 = Sunday) onto the
/// 1-7 (1 = Sunday) numbering the `cron` crate uses.
///
/// Numeric terms are expanded into explicit day lists before shifting, so a
/// step applies to the whole range and `0-7` stays every day. Named terms
/// such as `Mon-Fri` pass through unchanged.
fn translate_day_of_week(field: &str) -> Result<String, String> {
    let mut days = BTreeSet::new();
    let mut named = Vec::new();

    for part in field.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => (range, Some(step)),
            None => (part, None),
        };

        let numeric = range.chars().any(|c| c.is_ascii_digit()) || (range == "*" && step.is_some());
        if !numeric {
            named.push(part.to_string());
            continue;
        }

        let (lo, hi) = if range == "*" {
            (0, 6)
        } else {
            match range.split_once('-') {
                Some((lo, hi)) => (day_number(lo)?, day_number(hi)?),
                // "n/step" runs from n to the end of the week.
                None if step.is_some() => (day_number(range)?, 7),
                None => {
                    let n = day_number(range)?;
                    (n, n)
                }
            }
        };
        if lo > hi {
            return Err(format!("day-of-week range '{range}' runs backwards"));
        }

        let step = match step {
            Some(step) => step
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| format!("invalid day-of-week step '{step}'"))?,
            None => 1,
        };

        for day in (lo..=hi).step_by(step) {
            days.insert(day % 7 + 1);
        }
    }

    Ok(days
        .iter()
        .map(u8::to_string)
        .chain(named)
        .collect::<Vec<_>>()
        .join(","))
}

fn day_number(token: &str) -> Result<u8, String> {
    token
        .parse::<u8>()
        .ok()
        .filter(|n| *n <= 7)
        .ok_or_else(|| format!("day of week '{token}' is not in 0-7"))
}

fn parse_delta(input: &str) -> Option<Duration> {
    let unit_at = input.find(|c: char| !c.is_ascii_digit())?;
    let (digits, unit) = input.split_at(unit_at);
    let n: i64 = digits.parse().ok()?;
    if n <= 0 {
        return None;
    }
    match unit {
        "s" => Duration::try_seconds(n),
        "m" => Duration::try_minutes(n),
        "h" => Duration::try_hours(n),
        "d" => Duration::try_days(n),
        "w" => Duration::try_weeks(n),
        _ => None,
    }
}

fn format_delta(delta: Duration) -> String {
    let secs = delta.num_seconds();
    for (unit, size) in [("w", 604_800), ("d", 86_400), ("h", 3_600), ("m", 60)] {
        if secs % size == 0 {
            return format!("{}{}", secs / size, unit);
        }
    }
    format!("{}s", secs)
}

/// A job's recurrence definition plus its first valid logical time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSpec {
    /// How often the job fires.
    pub cadence: Cadence,

    /// First valid logical time. No run exists before it.
    pub start: DateTime<Utc>,
}

impl ScheduleSpec {
    /// Create a new ScheduleSpec.
    pub fn new(cadence: Cadence, start: DateTime<Utc>) -> Self {
        Self { cadence, start }
    }

    /// Parse the cadence from a schedule string.
    pub fn parse(expr: &str, start: DateTime<Utc>) -> Result<Self, ScheduleError> {
        Ok(Self::new(expr.parse()?, start))
    }

    /// Interval owned by the run at `logical_time`.
    pub fn interval_for(&self, logical_time: DateTime<Utc>) -> Result<DataInterval, ScheduleError> {
        compute_interval(self, logical_time)
    }

    /// Interval owned by the job's very first run.
    pub fn first_interval(&self) -> Result<DataInterval, ScheduleError> {
        compute_interval(self, self.start)
    }
}

/// Compute the responsibility interval `[logical_time, next firing)` for the
/// run of `schedule` at `logical_time`.
///
/// The lower bound is the logical time itself, so the very first run starts
/// exactly at the schedule's declared first valid time.
pub fn compute_interval(
    schedule: &ScheduleSpec,
    logical_time: DateTime<Utc>,
) -> Result<DataInterval, ScheduleError> {
    if logical_time < schedule.start {
        return Err(ScheduleError::BeforeStart {
            logical_time,
            start: schedule.start,
        });
    }

    let end = schedule
        .cadence
        .next_after(logical_time)
        .ok_or_else(|| ScheduleError::NoNextFiring {
            expr: schedule.cadence.to_string(),
            after: logical_time,
        })?;

    DataInterval::new(logical_time, end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ymd(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn spec(expr: &str, start: DateTime<Utc>) -> ScheduleSpec {
        ScheduleSpec::parse(expr, start).unwrap()
    }

    #[test]
    fn test_weekly_interval() {
        let schedule = spec("@weekly", ymd(2024, 1, 7));
        let interval = compute_interval(&schedule, ymd(2024, 2, 4)).unwrap();
        assert_eq!(interval.start(), ymd(2024, 2, 4));
        assert_eq!(interval.end(), ymd(2024, 2, 11));
    }

    #[test]
    fn test_daily_interval_with_minute_offset() {
        let start = Utc.with_ymd_and_hms(2024, 1, 7, 0, 1, 0).unwrap();
        let schedule = spec("1 0 * * *", start);
        let logical = Utc.with_ymd_and_hms(2024, 2, 10, 0, 1, 0).unwrap();
        let interval = compute_interval(&schedule, logical).unwrap();
        assert_eq!(interval.end(), Utc.with_ymd_and_hms(2024, 2, 11, 0, 1, 0).unwrap());
    }

    #[test]
    fn test_monthly_interval_spans_calendar_month() {
        let schedule = spec("0 0 7 * *", ymd(2024, 1, 7));

        let jan = compute_interval(&schedule, ymd(2024, 1, 7)).unwrap();
        assert_eq!(jan.end(), ymd(2024, 2, 7));
        assert_eq!(jan.duration().num_days(), 31);

        let feb = compute_interval(&schedule, ymd(2024, 2, 7)).unwrap();
        assert_eq!(feb.end(), ymd(2024, 3, 7));
        assert_eq!(feb.duration().num_days(), 29);
    }

    #[test]
    fn test_first_run_starts_at_declared_start() {
        // Start is a Wednesday, not a weekly firing time.
        let start = ymd(2024, 2, 7);
        let schedule = spec("@weekly", start);
        let interval = schedule.first_interval().unwrap();
        assert_eq!(interval.start(), start);
        assert_eq!(interval.end(), ymd(2024, 2, 11));
    }

    #[test]
    fn test_before_start_is_rejected() {
        let schedule = spec("@daily", ymd(2024, 2, 1));
        let err = compute_interval(&schedule, ymd(2024, 1, 31)).unwrap_err();
        assert!(matches!(err, ScheduleError::BeforeStart { .. }));
    }

    #[test]
    fn test_manual_schedule_has_no_interval() {
        let schedule = spec("@once", ymd(2024, 2, 1));
        let err = compute_interval(&schedule, ymd(2024, 2, 3)).unwrap_err();
        assert!(matches!(err, ScheduleError::NoNextFiring { .. }));
    }

    #[test]
    fn test_fixed_delta_interval() {
        let schedule = spec("every:6h", ymd(2024, 2, 1));
        let logical = Utc.with_ymd_and_hms(2024, 2, 1, 3, 0, 0).unwrap();
        let interval = compute_interval(&schedule, logical).unwrap();
        assert_eq!(interval.end(), Utc.with_ymd_and_hms(2024, 2, 1, 9, 0, 0).unwrap());
    }

    #[test]
    fn test_intervals_are_non_empty_and_start_at_logical_time() {
        let schedules = ["@hourly", "@daily", "@weekly", "@monthly", "@yearly", "0 0 7 * *", "every:90m"];
        for expr in schedules {
            let schedule = spec(expr, ymd(2024, 1, 1));
            let mut logical = ymd(2024, 1, 1);
            for _ in 0..24 {
                let interval = compute_interval(&schedule, logical).unwrap();
                assert!(interval.start() < interval.end(), "{expr}");
                assert_eq!(interval.start(), logical, "{expr}");
                logical = interval.end();
            }
        }
    }

    #[test]
    fn test_standard_day_of_week_numbering() {
        // 2024-02-04 is a Sunday; "0 0 * * 0" fires on Sundays.
        let schedule = spec("0 0 * * 0", ymd(2024, 1, 1));
        let interval = compute_interval(&schedule, ymd(2024, 2, 4)).unwrap();
        assert_eq!(interval.end(), ymd(2024, 2, 11));

        // Monday through Friday.
        let weekdays = spec("0 0 * * 1-5", ymd(2024, 1, 1));
        let friday = compute_interval(&weekdays, ymd(2024, 2, 9)).unwrap();
        assert_eq!(friday.end(), ymd(2024, 2, 12));
    }

    #[test]
    fn test_day_of_week_ranges_and_steps() {
        // 2024-02-05 is a Monday.
        let every_day = spec("0 0 * * 0-7", ymd(2024, 1, 1));
        assert_eq!(compute_interval(&every_day, ymd(2024, 2, 5)).unwrap().end(), ymd(2024, 2, 6));
        assert_eq!(compute_interval(&every_day, ymd(2024, 2, 10)).unwrap().end(), ymd(2024, 2, 11));

        // Monday, Wednesday, Friday and Sunday.
        let odd = spec("0 0 * * 1-7/2", ymd(2024, 1, 1));
        assert_eq!(compute_interval(&odd, ymd(2024, 2, 5)).unwrap().end(), ymd(2024, 2, 7));
        assert_eq!(compute_interval(&odd, ymd(2024, 2, 9)).unwrap().end(), ymd(2024, 2, 11));
        assert_eq!(compute_interval(&odd, ymd(2024, 2, 11)).unwrap().end(), ymd(2024, 2, 12));

        // Friday through Sunday.
        let weekend = spec("0 0 * * 5-7", ymd(2024, 1, 1));
        assert_eq!(compute_interval(&weekend, ymd(2024, 2, 9)).unwrap().end(), ymd(2024, 2, 10));
        assert_eq!(compute_interval(&weekend, ymd(2024, 2, 10)).unwrap().end(), ymd(2024, 2, 11));
        assert_eq!(compute_interval(&weekend, ymd(2024, 2, 11)).unwrap().end(), ymd(2024, 2, 16));

        // Sunday, Tuesday, Thursday and Saturday.
        let even = spec("0 0 * * */2", ymd(2024, 1, 1));
        assert_eq!(compute_interval(&even, ymd(2024, 2, 4)).unwrap().end(), ymd(2024, 2, 6));
        assert_eq!(compute_interval(&even, ymd(2024, 2, 10)).unwrap().end(), ymd(2024, 2, 11));

        // Names are left to the cron crate.
        let named = spec("0 0 * * Mon-Fri", ymd(2024, 1, 1));
        assert_eq!(compute_interval(&named, ymd(2024, 2, 9)).unwrap().end(), ymd(2024, 2, 12));
    }

    #[test]
    fn test_day_of_week_out_of_range_is_rejected() {
        for bad in ["0 0 * * 255", "0 0 * * 8", "0 0 * * 3-9", "0 0 * * 5-2", "0 0 * * 1/0", "0 0 * * 1-Fri"] {
            let err = bad.parse::<Cadence>().unwrap_err();
            assert!(matches!(err, ScheduleError::InvalidExpression { .. }), "{bad:?}");
        }
    }

    #[test]
    fn test_parse_errors() {
        for bad in ["", "@fortnightly", "every:0m", "every:5x", "0 0 *", "not a cron at all x y"] {
            assert!(bad.parse::<Cadence>().is_err(), "{bad:?} should not parse");
        }
    }

    #[test]
    fn test_cadence_round_trips_through_string() {
        for expr in ["@weekly", "cron:1 0 * * *", "every:2d", "@once"] {
            let cadence: Cadence = expr.parse().unwrap();
            let reparsed: Cadence = cadence.to_string().parse().unwrap();
            assert_eq!(cadence, reparsed);
        }
    }

    #[test]
    fn test_schedule_spec_json() {
        let json = r#"{"cadence":"@monthly","start":"2024-01-01T00:00:00Z"}"#;
        let schedule: ScheduleSpec = serde_json::from_str(json).unwrap();
        assert_eq!(schedule.start, ymd(2024, 1, 1));
        assert!(serde_json::from_str::<ScheduleSpec>(
            r#"{"cadence":"@sometimes","start":"2024-01-01T00:00:00Z"}"#
        )
        .is_err());
    }
}
