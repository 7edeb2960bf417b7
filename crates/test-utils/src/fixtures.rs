//! Common test fixtures for gridcat tests.
//!
//! This module provides pre-defined axes and times that represent common
//! scenarios in forecast catalogs.

use chrono::{DateTime, Duration, TimeZone, Utc};
use gridcat_common::{AttrKey, Attributes, Axis};

/// Common time definitions for testing.
pub mod time {
    /// Reference time used throughout the test suite
    pub const REFERENCE_TIME: &str = "2024-01-15T12:00:00Z";
}

/// The reference time as a timestamp.
pub fn reference_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
}

/// `reference_time() + hours`.
pub fn hour(hours: i64) -> DateTime<Utc> {
    reference_time() + Duration::hours(hours)
}

/// Temporal axis `time` at the given hour offsets from the reference time.
pub fn time_axis(hours: &[i64]) -> Axis {
    Axis::time("time", hours.iter().map(|&h| hour(h)))
}

/// Latitude axis with the given values.
pub fn lat_axis(values: &[f64]) -> Axis {
    Axis::numeric("lat", values.iter().copied())
}

/// Longitude axis with the given values.
pub fn lon_axis(values: &[f64]) -> Axis {
    Axis::numeric("lon", values.iter().copied())
}

/// Vertical level axis.
pub fn level_axis(values: &[f64]) -> Axis {
    Axis::levels("level", values.iter().copied())
}

/// Station axis with labels.
pub fn station_axis(labels: &[&str]) -> Axis {
    Axis::categorical("station", labels.iter().copied())
}

/// Attributes carrying only a units string.
pub fn units(units: &str) -> Attributes {
    Attributes::new().with(AttrKey::Units, units.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_time_matches_constant() {
        let parsed = DateTime::parse_from_rfc3339(time::REFERENCE_TIME)
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(reference_time(), parsed);
    }

    #[test]
    fn test_time_axis_offsets() {
        let axis = time_axis(&[0, 6]);
        assert_eq!(axis.len(), 2);
        assert_eq!(axis.time_bounds(), Some((hour(0), hour(6))));
    }
}
