//! Time handling utilities.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::axis::Axis;

const SUFFIX_FORMAT: &str = "%Y%m%d%H";

/// Inclusive range of timestamps covered by a temporal axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Range spanned by a temporal axis (min to max, regardless of axis order).
    pub fn from_axis(axis: &Axis) -> Option<Self> {
        if !axis.is_temporal() {
            return None;
        }
        let mut times = axis.values().iter().filter_map(|v| v.as_time());
        let first = times.next()?;
        let (start, end) = times.fold((first, first), |(lo, hi), t| (lo.min(t), hi.max(t)));
        Some(Self { start, end })
    }

    /// Filename suffix, e.g. `2024010100-2024010318`.
    pub fn suffix(&self) -> String {
        format!(
            "{}-{}",
            self.start.format(SUFFIX_FORMAT),
            self.end.format(SUFFIX_FORMAT)
        )
    }

    /// Parse a suffix produced by [`DateRange::suffix`].
    pub fn parse_suffix(s: &str) -> Result<Self, TimeParseError> {
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| TimeParseError::InvalidFormat(s.to_string()))?;
        Ok(Self::new(parse_hourly(start)?, parse_hourly(end)?))
    }

    pub fn contains(&self, dt: &DateTime<Utc>) -> bool {
        dt >= &self.start && dt <= &self.end
    }
}

fn parse_hourly(s: &str) -> Result<DateTime<Utc>, TimeParseError> {
    NaiveDateTime::parse_from_str(&format!("{}0000", s), "%Y%m%d%H%M%S")
        .map(|ndt| Utc.from_utc_datetime(&ndt))
        .map_err(|_| TimeParseError::InvalidFormat(s.to_string()))
}

#[derive(Debug, thiserror::Error)]
pub enum TimeParseError {
    #[error("Invalid time format: {0}")]
    InvalidFormat(String),
}
