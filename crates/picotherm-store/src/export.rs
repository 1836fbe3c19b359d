//! CSV and JSON export of a series.

use std::io::Write;

use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use picotherm_types::{Measurement, Series};

use crate::error::{Error, Result};

/// Export format for [`write_series`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    /// Pretty-printed JSON array.
    #[default]
    Json,
    /// CSV with a header row.
    Csv,
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(format!("unknown export format '{}': expected json or csv", other)),
        }
    }
}

#[derive(Serialize)]
struct ExportRow {
    timestamp_ms: i64,
    time: String,
    temperature: f64,
    humidity: f64,
}

impl ExportRow {
    fn from_measurement(m: &Measurement) -> Result<Self> {
        let nanos = i128::from(m.timestamp_ms) * 1_000_000;
        let time = OffsetDateTime::from_unix_timestamp_nanos(nanos)
            .map_err(|e| Error::InvalidTimestamp(e.to_string()))?
            .format(&Rfc3339)
            .map_err(|e| Error::InvalidTimestamp(e.to_string()))?;
        Ok(Self {
            timestamp_ms: m.timestamp_ms,
            time,
            temperature: m.temperature,
            humidity: m.humidity,
        })
    }
}

/// Write `series` as CSV (`timestamp_ms,time,temperature,humidity`).
pub fn write_csv<W: Write>(series: &Series, writer: W) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    for m in series {
        csv.serialize(ExportRow::from_measurement(m)?)?;
    }
    if series.is_empty() {
        csv.write_record(["timestamp_ms", "time", "temperature", "humidity"])?;
    }
    csv.flush()?;
    Ok(())
}

/// Write `series` as a pretty-printed JSON array.
pub fn write_json<W: Write>(series: &Series, writer: W) -> Result<()> {
    let rows = series
        .iter()
        .map(ExportRow::from_measurement)
        .collect::<Result<Vec<_>>>()?;
    serde_json::to_writer_pretty(writer, &rows)?;
    Ok(())
}

/// Write `series` in the given format.
pub fn write_series<W: Write>(series: &Series, format: ExportFormat, writer: W) -> Result<()> {
    match format {
        ExportFormat::Json => write_json(series, writer),
        ExportFormat::Csv => write_csv(series, writer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Series {
        Series::new(vec![
            Measurement::new(1_709_251_200_000, 21.5, 40.0),
            Measurement::new(1_709_251_260_500, 21.25, 41.5),
        ])
        .unwrap()
    }

    #[test]
    fn test_csv_export() {
        let mut out = Vec::new();
        write_csv(&sample(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "timestamp_ms,time,temperature,humidity");
        assert_eq!(lines[1], "1709251200000,2024-03-01T00:00:00Z,21.5,40.0");
        assert_eq!(lines[2], "1709251260500,2024-03-01T00:01:00.5Z,21.25,41.5");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_csv_export_empty_has_header() {
        let mut out = Vec::new();
        write_csv(&Series::empty(), &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap().trim_end(),
            "timestamp_ms,time,temperature,humidity"
        );
    }

    #[test]
    fn test_json_export() {
        let mut out = Vec::new();
        write_series(&sample(), ExportFormat::Json, &mut out).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();

        let rows = value.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["timestamp_ms"], 1_709_251_200_000i64);
        assert_eq!(rows[0]["time"], "2024-03-01T00:00:00Z");
        assert_eq!(rows[1]["humidity"], 41.5);
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "reader went away"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_csv_write_failure_is_io_error() {
        let err = write_csv(&sample(), BrokenPipe).unwrap_err();
        assert!(matches!(err, Error::Io(_)), "{err:?}");
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert_eq!("json".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert!("xml".parse::<ExportFormat>().is_err());
    }
}
