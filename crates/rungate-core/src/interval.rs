//! Half-open responsibility intervals.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ScheduleError;

/// The half-open span `[start, end)` a run is accountable for.
///
/// `start < end` holds for every value produced by [`DataInterval::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawInterval")]
pub struct DataInterval {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

#[derive(Deserialize)]
struct RawInterval {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TryFrom<RawInterval> for DataInterval {
    type Error = ScheduleError;

    fn try_from(raw: RawInterval) -> Result<Self, Self::Error> {
        Self::new(raw.start, raw.end)
    }
}

impl DataInterval {
    /// Create an interval, rejecting empty or inverted spans.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, ScheduleError> {
        if start >= end {
            return Err(ScheduleError::EmptyInterval { start, end });
        }
        Ok(Self { start, end })
    }

    /// Inclusive lower bound.
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Exclusive upper bound.
    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Whether `t` falls inside the interval. The upper bound is excluded.
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t < self.end
    }

    /// Length of the interval.
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

impl fmt::Display for DataInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, d, h, m, 0).unwrap()
    }

    #[test]
    fn test_rejects_empty_and_inverted() {
        assert!(DataInterval::new(at(4, 0, 0), at(4, 0, 0)).is_err());
        assert!(DataInterval::new(at(11, 0, 0), at(4, 0, 0)).is_err());
    }

    #[test]
    fn test_contains_is_half_open() {
        let interval = DataInterval::new(at(4, 0, 0), at(11, 0, 0)).unwrap();
        assert!(interval.contains(at(4, 0, 0)));
        assert!(interval.contains(at(7, 0, 0)));
        assert!(!interval.contains(at(11, 0, 0)));
        assert!(!interval.contains(at(11, 0, 1)));
        assert!(!interval.contains(at(3, 23, 59)));
    }

    #[test]
    fn test_deserialize_validates_bounds() {
        let ok = r#"{"start":"2024-02-04T00:00:00Z","end":"2024-02-11T00:00:00Z"}"#;
        let interval: DataInterval = serde_json::from_str(ok).unwrap();
        assert_eq!(interval.end(), at(11, 0, 0));

        let inverted = r#"{"start":"2024-02-11T00:00:00Z","end":"2024-02-04T00:00:00Z"}"#;
        assert!(serde_json::from_str::<DataInterval>(inverted).is_err());
    }

    #[test]
    fn test_display() {
        let interval = DataInterval::new(at(4, 0, 0), at(11, 0, 0)).unwrap();
        assert_eq!(
            interval.to_string(),
            "[2024-02-04T00:00:00+00:00, 2024-02-11T00:00:00+00:00)"
        );
    }
}
