//! Time ranges and temporal coordinate reference systems.

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A half-open time range `[start, end)`.
///
/// A range with `start == end` is an instant. Instants are legal query
/// ranges and intersect any range that contains them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// A zero-length range at the given time.
    pub fn instant(time: DateTime<Utc>) -> Self {
        Self {
            start: time,
            end: time,
        }
    }

    /// The widest range a catalog queries with, years 1 through 9999.
    pub fn unbounded() -> Self {
        let start = Utc.with_ymd_and_hms(1, 1, 1, 0, 0, 0).single();
        let end = Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 59).single();
        Self::new(start.unwrap_or_default(), end.unwrap_or_default())
    }

    /// Parse "start/end" or a single ISO 8601 time.
    pub fn parse(s: &str) -> Result<Self, TimeParseError> {
        if let Some((start, end)) = s.split_once('/') {
            let range = Self::new(parse_iso8601(start)?, parse_iso8601(end)?);
            if range.end < range.start {
                return Err(TimeParseError::Inverted(s.to_string()));
            }
            return Ok(range);
        }
        Ok(Self::instant(parse_iso8601(s)?))
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn is_instant(&self) -> bool {
        self.start == self.end
    }

    pub fn center(&self) -> DateTime<Utc> {
        self.start + self.duration() / 2
    }

    pub fn contains(&self, dt: &DateTime<Utc>) -> bool {
        if self.is_instant() {
            dt == &self.start
        } else {
            dt >= &self.start && dt < &self.end
        }
    }

    /// Check whether two ranges share at least one instant.
    pub fn intersects(&self, other: &TimeRange) -> bool {
        if self.is_instant() || other.is_instant() {
            self.start <= other.end && other.start <= self.end
        } else {
            self.start < other.end && other.start < self.end
        }
    }

    /// Length of the overlap between two ranges (zero when disjoint).
    pub fn overlap(&self, other: &TimeRange) -> Duration {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        if end > start {
            end - start
        } else {
            Duration::zero()
        }
    }

    /// Smallest range containing both ranges.
    pub fn union(&self, other: &TimeRange) -> TimeRange {
        TimeRange::new(self.start.min(other.start), self.end.max(other.end))
    }
}

/// Parse an ISO 8601 timestamp, accepting a missing zone (UTC) or a bare date.
pub fn parse_iso8601(s: &str) -> Result<DateTime<Utc>, TimeParseError> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Ok(Utc.from_utc_datetime(&ndt));
    }

    if let Ok(ndt) = NaiveDateTime::parse_from_str(&format!("{}T00:00:00", s), "%Y-%m-%dT%H:%M:%S") {
        return Ok(Utc.from_utc_datetime(&ndt));
    }

    Err(TimeParseError::InvalidFormat(s.to_string()))
}

#[derive(Debug, thiserror::Error)]
pub enum TimeParseError {
    #[error("Invalid time format: {0}")]
    InvalidFormat(String),

    #[error("Time range ends before it starts: {0}")]
    Inverted(String),
}

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// A temporal CRS measuring time as fractional days since an origin.
///
/// Envelopes carry time in this CRS so that time can sit next to the
/// spatial ordinates in a single `f64` array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TemporalCrs {
    pub origin: DateTime<Utc>,
}

impl TemporalCrs {
    pub fn new(origin: DateTime<Utc>) -> Self {
        Self { origin }
    }

    /// Convert a coordinate value (days since origin) to a calendar date.
    pub fn to_datetime(&self, value: f64) -> DateTime<Utc> {
        self.origin + Duration::milliseconds((value * MILLIS_PER_DAY).round() as i64)
    }

    /// Convert a calendar date to a coordinate value (days since origin).
    pub fn to_value(&self, time: DateTime<Utc>) -> f64 {
        (time - self.origin).num_milliseconds() as f64 / MILLIS_PER_DAY
    }
}

impl Default for TemporalCrs {
    /// Days since 1950-01-01, the usual origin for oceanographic series.
    fn default() -> Self {
        Self::new(Utc.with_ymd_and_hms(1950, 1, 1, 0, 0, 0).single().unwrap_or_default())
    }
}
