//! Calendar-aligned periods and the blob keys derived from them.
//!
//! All calendar arithmetic is UTC. A [`Period`] is identified by the device,
//! its [`Granularity`], and the first day it covers; two periods of different
//! granularity covering the same instant are distinct keys.

use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::{Date, Month, OffsetDateTime};

use crate::error::ParseError;
use crate::types::TimeWindow;

/// File name of every blob under its period prefix.
pub const BLOB_FILE_NAME: &str = "data.pts";

/// Storage granularity of a blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Granularity {
    /// One UTC calendar day.
    Day,
    /// One UTC calendar month.
    Month,
    /// One UTC calendar year.
    Year,
}

impl Granularity {
    /// All granularities, finest first.
    pub const ALL: [Granularity; 3] = [Granularity::Day, Granularity::Month, Granularity::Year];

    /// Align `date` to the start of the period of this granularity containing it.
    #[must_use]
    pub fn align(self, date: Date) -> Date {
        match self {
            Granularity::Day => date,
            Granularity::Month => date.replace_day(1).unwrap_or(date),
            Granularity::Year => date
                .replace_day(1)
                .and_then(|d| d.replace_month(Month::January))
                .unwrap_or(date),
        }
    }

    /// First day of the period following the one that starts at `start`.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::OutOfRange`] past the end of the supported calendar.
    pub fn next_start(self, start: Date) -> Result<Date, ParseError> {
        let start = self.align(start);
        match self {
            Granularity::Day => next_day(start),
            Granularity::Month => next_month(start),
            Granularity::Year => next_year(start),
        }
    }

    /// Lowercase name used in logs, config, and the trigger surface.
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Day => "day",
            Granularity::Month => "month",
            Granularity::Year => "year",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = ParseError;

    /// Accepts `day`/`daily`, `month`/`monthly`, `year`/`yearly` (any case).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "day" | "daily" => Ok(Granularity::Day),
            "month" | "monthly" => Ok(Granularity::Month),
            "year" | "yearly" => Ok(Granularity::Year),
            other => Err(ParseError::InvalidData(format!(
                "unknown granularity '{}': expected day, month, or year",
                other
            ))),
        }
    }
}

/// A (device, granularity, calendar-aligned start) key identifying one blob.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Period {
    /// Device identifier.
    pub device: String,
    /// Granularity of the period.
    pub granularity: Granularity,
    /// First day covered (already aligned).
    pub start: Date,
}

impl Period {
    /// Create the period of `granularity` containing `date`.
    pub fn new(device: impl Into<String>, granularity: Granularity, date: Date) -> Self {
        Self {
            device: device.into(),
            granularity,
            start: granularity.align(date),
        }
    }

    /// Day period containing `date`.
    pub fn day(device: impl Into<String>, date: Date) -> Self {
        Self::new(device, Granularity::Day, date)
    }

    /// Month period containing `date`.
    pub fn month(device: impl Into<String>, date: Date) -> Self {
        Self::new(device, Granularity::Month, date)
    }

    /// Year period containing `date`.
    pub fn year(device: impl Into<String>, date: Date) -> Self {
        Self::new(device, Granularity::Year, date)
    }

    /// First day after this period.
    pub fn end(&self) -> Result<Date, ParseError> {
        self.granularity.next_start(self.start)
    }

    /// Half-open millisecond window covered by this period.
    pub fn window(&self) -> Result<TimeWindow, ParseError> {
        Ok(TimeWindow::new(
            date_start_ms(self.start),
            date_start_ms(self.end()?),
        ))
    }

    /// Returns `true` if the period ended at or before the start of `today`.
    ///
    /// Open periods (containing today or lying in the future) may legitimately
    /// have no blob yet.
    pub fn is_closed(&self, today: Date) -> bool {
        self.end().is_ok_and(|end| end <= today)
    }

    /// Blob key for this period.
    ///
    /// ```text
    /// {device}/{YYYY}/{MM}/{DD}/data.pts   day
    /// {device}/{YYYY}/{MM}/data.pts        month
    /// {device}/{YYYY}/data.pts             year
    /// ```
    ///
    /// Year, month, and day components have fixed widths, so no two
    /// (device, period) pairs share a key even when device ids contain `/`.
    pub fn key(&self) -> String {
        let year = self.start.year();
        let month = u8::from(self.start.month());
        let day = self.start.day();
        match self.granularity {
            Granularity::Day => format!(
                "{}/{:04}/{:02}/{:02}/{}",
                self.device, year, month, day, BLOB_FILE_NAME
            ),
            Granularity::Month => {
                format!("{}/{:04}/{:02}/{}", self.device, year, month, BLOB_FILE_NAME)
            }
            Granularity::Year => format!("{}/{:04}/{}", self.device, year, BLOB_FILE_NAME),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let year = self.start.year();
        let month = u8::from(self.start.month());
        match self.granularity {
            Granularity::Day => write!(
                f,
                "{} day {:04}-{:02}-{:02}",
                self.device,
                year,
                month,
                self.start.day()
            ),
            Granularity::Month => write!(f, "{} month {:04}-{:02}", self.device, year, month),
            Granularity::Year => write!(f, "{} year {:04}", self.device, year),
        }
    }
}

/// Unix milliseconds of midnight UTC at the start of `date`.
pub fn date_start_ms(date: Date) -> i64 {
    date.midnight().assume_utc().unix_timestamp() * 1000
}

/// UTC calendar date containing the Unix millisecond `timestamp_ms`.
pub fn date_of_ms(timestamp_ms: i64) -> Result<Date, ParseError> {
    Ok(OffsetDateTime::from_unix_timestamp(timestamp_ms.div_euclid(1000))?.date())
}

/// Unix milliseconds of an `OffsetDateTime`, truncated toward negative infinity.
pub fn datetime_ms(datetime: OffsetDateTime) -> i64 {
    (datetime.unix_timestamp_nanos().div_euclid(1_000_000)) as i64
}

/// The day after `date`.
pub fn next_day(date: Date) -> Result<Date, ParseError> {
    date.next_day()
        .ok_or_else(|| ParseError::OutOfRange(format!("no day after {}", date)))
}

/// First day of the month after the one containing `date`.
pub fn next_month(date: Date) -> Result<Date, ParseError> {
    let (year, month) = match date.month() {
        Month::December => (date.year() + 1, Month::January),
        month => (date.year(), month.next()),
    };
    Ok(Date::from_calendar_date(year, month, 1)?)
}

/// First day of the year after the one containing `date`.
pub fn next_year(date: Date) -> Result<Date, ParseError> {
    Ok(Date::from_calendar_date(date.year() + 1, Month::January, 1)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn test_align() {
        let d = date!(2024 - 03 - 17);
        assert_eq!(Granularity::Day.align(d), d);
        assert_eq!(Granularity::Month.align(d), date!(2024 - 03 - 01));
        assert_eq!(Granularity::Year.align(d), date!(2024 - 01 - 01));
    }

    #[test]
    fn test_next_start_rolls_over() {
        assert_eq!(
            Granularity::Day.next_start(date!(2024 - 02 - 29)).unwrap(),
            date!(2024 - 03 - 01)
        );
        assert_eq!(
            Granularity::Month.next_start(date!(2024 - 12 - 15)).unwrap(),
            date!(2025 - 01 - 01)
        );
        assert_eq!(
            Granularity::Year.next_start(date!(2024 - 06 - 01)).unwrap(),
            date!(2025 - 01 - 01)
        );
    }

    #[test]
    fn test_granularity_from_str() {
        assert_eq!("daily".parse::<Granularity>().unwrap(), Granularity::Day);
        assert_eq!("Month".parse::<Granularity>().unwrap(), Granularity::Month);
        assert_eq!("YEARLY".parse::<Granularity>().unwrap(), Granularity::Year);
        assert!("weekly".parse::<Granularity>().is_err());
    }

    #[test]
    fn test_period_keys() {
        let d = date!(2024 - 03 - 07);
        assert_eq!(Period::day("picotherm/1", d).key(), "picotherm/1/2024/03/07/data.pts");
        assert_eq!(Period::month("picotherm/1", d).key(), "picotherm/1/2024/03/data.pts");
        assert_eq!(Period::year("picotherm/1", d).key(), "picotherm/1/2024/data.pts");
    }

    #[test]
    fn test_period_keys_do_not_collide_across_devices() {
        // A device id that looks like a key prefix of another device.
        let a = Period::day("dev", date!(2024 - 03 - 07)).key();
        let b = Period::month("dev/2024", date!(2003 - 07 - 01)).key();
        let c = Period::year("dev/2024/03", date!(0007 - 01 - 01)).key();
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(b, c);
    }

    #[test]
    fn test_period_window_and_closed() {
        let p = Period::month("d", date!(2024 - 02 - 10));
        let w = p.window().unwrap();
        assert_eq!(w.start_ms, date_start_ms(date!(2024 - 02 - 01)));
        assert_eq!(w.end_ms, date_start_ms(date!(2024 - 03 - 01)));
        assert!(p.is_closed(date!(2024 - 03 - 01)));
        assert!(!p.is_closed(date!(2024 - 02 - 29)));
    }

    #[test]
    fn test_period_display() {
        let d = date!(2024 - 03 - 07);
        assert_eq!(Period::day("x", d).to_string(), "x day 2024-03-07");
        assert_eq!(Period::month("x", d).to_string(), "x month 2024-03");
        assert_eq!(Period::year("x", d).to_string(), "x year 2024");
    }

    #[test]
    fn test_date_of_ms_roundtrip() {
        let d = date!(2024 - 03 - 07);
        let ms = date_start_ms(d);
        assert_eq!(date_of_ms(ms).unwrap(), d);
        assert_eq!(date_of_ms(ms - 1).unwrap(), date!(2024 - 03 - 06));
        assert_eq!(date_of_ms(ms + 86_399_999).unwrap(), d);
    }
}
