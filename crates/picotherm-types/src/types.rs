//! Core types for picotherm sensor data.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Number of fields carried by every [`Measurement`].
pub const MEASUREMENT_FIELDS: u8 = 3;

/// A single sensor reading.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Measurement {
    /// Milliseconds since the Unix epoch (UTC).
    pub timestamp_ms: i64,
    /// Temperature in degrees Celsius.
    pub temperature: f64,
    /// Relative humidity percentage.
    pub humidity: f64,
}

impl Measurement {
    /// Create a new measurement.
    pub fn new(timestamp_ms: i64, temperature: f64, humidity: f64) -> Self {
        Self {
            timestamp_ms,
            temperature,
            humidity,
        }
    }

    /// Estimated absolute humidity in g/m³, from the Magnus formula for the
    /// saturation vapour pressure over water.
    pub fn absolute_humidity(&self) -> f64 {
        let t = self.temperature;
        let saturation_hpa = 6.112 * ((17.67 * t) / (t + 243.5)).exp();
        saturation_hpa * self.humidity * 2.1674 / (273.15 + t)
    }
}

/// A half-open time window `[start_ms, end_ms)` in Unix milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TimeWindow {
    /// Inclusive lower bound.
    pub start_ms: i64,
    /// Exclusive upper bound.
    pub end_ms: i64,
}

impl TimeWindow {
    /// Create a window. `start_ms` may equal `end_ms` (empty window).
    pub fn new(start_ms: i64, end_ms: i64) -> Self {
        Self { start_ms, end_ms }
    }

    /// Returns `true` if the window contains no instant.
    pub fn is_empty(&self) -> bool {
        self.start_ms >= self.end_ms
    }

    /// Returns `true` if `timestamp_ms` lies inside the window.
    pub fn contains(&self, timestamp_ms: i64) -> bool {
        self.start_ms <= timestamp_ms && timestamp_ms < self.end_ms
    }

    /// The last millisecond inside the window.
    pub fn last_ms(&self) -> i64 {
        self.end_ms - 1
    }

    /// Intersection of two windows (may be empty).
    pub fn intersect(&self, other: &TimeWindow) -> TimeWindow {
        TimeWindow {
            start_ms: self.start_ms.max(other.start_ms),
            end_ms: self.end_ms.min(other.end_ms),
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start_ms, self.end_ms)
    }
}

/// An ordered sequence of measurements for one device.
///
/// A `Series` is always strictly ascending by `timestamp_ms` with no
/// duplicate timestamps. Every constructor and mutator preserves that.
///
/// # Examples
///
/// ```
/// use picotherm_types::{Measurement, Series};
///
/// let series = Series::new(vec![
///     Measurement::new(1_000, 21.0, 40.0),
///     Measurement::new(2_000, 21.5, 41.0),
/// ])?;
/// assert_eq!(series.len(), 2);
/// assert_eq!(series.last_timestamp(), Some(2_000));
///
/// // Duplicates and disorder are rejected.
/// assert!(Series::new(vec![
///     Measurement::new(2_000, 21.0, 40.0),
///     Measurement::new(2_000, 21.5, 41.0),
/// ]).is_err());
/// # Ok::<(), picotherm_types::ParseError>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(try_from = "Vec<Measurement>", into = "Vec<Measurement>")
)]
pub struct Series {
    points: Vec<Measurement>,
}

impl Series {
    /// Build a series, rejecting data that is not strictly ascending.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::NotAscending`] naming the first offending index.
    pub fn new(points: Vec<Measurement>) -> Result<Self, ParseError> {
        check_ascending(&points)?;
        Ok(Self { points })
    }

    /// Build a series from arbitrary data: sorts by timestamp and keeps the
    /// first measurement of every duplicated timestamp.
    pub fn from_unsorted(mut points: Vec<Measurement>) -> Self {
        points.sort_by_key(|m| m.timestamp_ms);
        points.dedup_by_key(|m| m.timestamp_ms);
        Self { points }
    }

    /// An empty series.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of measurements.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns `true` if there are no measurements.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// First measurement.
    pub fn first(&self) -> Option<&Measurement> {
        self.points.first()
    }

    /// Last measurement.
    pub fn last(&self) -> Option<&Measurement> {
        self.points.last()
    }

    /// Timestamp of the first measurement.
    pub fn first_timestamp(&self) -> Option<i64> {
        self.first().map(|m| m.timestamp_ms)
    }

    /// Timestamp of the last measurement.
    pub fn last_timestamp(&self) -> Option<i64> {
        self.last().map(|m| m.timestamp_ms)
    }

    /// Borrow the measurements.
    pub fn as_slice(&self) -> &[Measurement] {
        &self.points
    }

    /// Iterate over the measurements.
    pub fn iter(&self) -> std::slice::Iter<'_, Measurement> {
        self.points.iter()
    }

    /// Consume the series, returning its measurements.
    pub fn into_inner(self) -> Vec<Measurement> {
        self.points
    }

    /// Append `other`, which must start strictly after this series ends.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::Overlap`] and leaves `self` unchanged if the
    /// first timestamp of `other` is not greater than the last of `self`.
    pub fn try_append(&mut self, other: Series) -> Result<(), ParseError> {
        if let (Some(last), Some(first)) = (self.last_timestamp(), other.first_timestamp())
            && first <= last
        {
            return Err(ParseError::Overlap { last, first });
        }
        self.points.extend(other.points);
        Ok(())
    }

    /// Append the part of `other` that lies strictly after this series' last
    /// timestamp. Returns the number of measurements that were dropped.
    pub fn extend_after(&mut self, other: Series) -> usize {
        let Some(last) = self.last_timestamp() else {
            self.points = other.points;
            return 0;
        };
        let skip = other.points.partition_point(|m| m.timestamp_ms <= last);
        self.points.extend_from_slice(&other.points[skip..]);
        skip
    }

    /// Measurements inside `window`, located by binary search on the sorted
    /// timestamp column (leftmost `>= start`, leftmost `>= end`).
    pub fn window(&self, window: TimeWindow) -> Series {
        let lo = self.points.partition_point(|m| m.timestamp_ms < window.start_ms);
        let hi = self.points.partition_point(|m| m.timestamp_ms < window.end_ms);
        if lo >= hi {
            return Series::empty();
        }
        Series {
            points: self.points[lo..hi].to_vec(),
        }
    }
}

fn check_ascending(points: &[Measurement]) -> Result<(), ParseError> {
    for (index, pair) in points.windows(2).enumerate() {
        if pair[1].timestamp_ms <= pair[0].timestamp_ms {
            return Err(ParseError::NotAscending {
                index: index + 1,
                previous: pair[0].timestamp_ms,
                timestamp: pair[1].timestamp_ms,
            });
        }
    }
    Ok(())
}

impl TryFrom<Vec<Measurement>> for Series {
    type Error = ParseError;

    fn try_from(points: Vec<Measurement>) -> Result<Self, Self::Error> {
        Series::new(points)
    }
}

impl From<Series> for Vec<Measurement> {
    fn from(series: Series) -> Self {
        series.points
    }
}

impl<'a> IntoIterator for &'a Series {
    type Item = &'a Measurement;
    type IntoIter = std::slice::Iter<'a, Measurement>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}
