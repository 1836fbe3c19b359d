//! Running one rollup granularity over many devices.
//!
//! A trigger names a granularity and, optionally, a date inside the period to
//! roll up. Without a date the most recently closed period is used:
//! yesterday, the previous calendar month, or the previous calendar year.
//!
//! Devices are rolled up concurrently and independently. A failing device is
//! logged and reported in the [`TriggerSummary`]; it never stops the others.

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use time::Date;
use tracing::{error, info};

use picotherm_core::{Error, Result, RollupEngine};
use picotherm_types::{Granularity, ParseError};

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

/// Request to roll up one period for every device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerRequest {
    /// Which rollup to run.
    pub granularity: Granularity,
    /// Any date inside the period (`YYYY-MM-DD`); defaults to the last
    /// closed period.
    #[serde(default, with = "iso_date::option", skip_serializing_if = "Option::is_none")]
    pub date: Option<Date>,
}

impl TriggerRequest {
    pub fn new(granularity: Granularity, date: Option<Date>) -> Self {
        Self { granularity, date }
    }

    /// First day of the period this request targets on `today`.
    pub fn resolve(&self, today: Date) -> Result<Date> {
        match self.date {
            Some(date) => Ok(self.granularity.align(date)),
            None => default_date(self.granularity, today),
        }
    }
}

/// First day of the most recently closed period of `granularity`.
pub fn default_date(granularity: Granularity, today: Date) -> Result<Date> {
    let current = granularity.align(today);
    let previous = current.previous_day().ok_or_else(|| {
        Error::Parse(ParseError::OutOfRange(format!(
            "no {} before {}",
            granularity, current
        )))
    })?;
    Ok(granularity.align(previous))
}

/// Human label of a period: `2024-03-07`, `2024-03`, or `2024`.
pub fn period_label(granularity: Granularity, start: Date) -> String {
    match granularity {
        Granularity::Day => format!(
            "{:04}-{:02}-{:02}",
            start.year(),
            u8::from(start.month()),
            start.day()
        ),
        Granularity::Month => format!("{:04}-{:02}", start.year(), u8::from(start.month())),
        Granularity::Year => format!("{:04}", start.year()),
    }
}

/// Result of one device's rollup.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceOutcome {
    pub device: String,
    pub ok: bool,
    /// The rollup report on success, the error message on failure.
    pub detail: serde_json::Value,
}

/// Per-device results of one trigger run.
#[derive(Debug, Clone, Serialize)]
pub struct TriggerSummary {
    pub granularity: Granularity,
    pub period: String,
    pub devices: Vec<DeviceOutcome>,
}

impl TriggerSummary {
    pub fn succeeded(&self) -> usize {
        self.devices.iter().filter(|d| d.ok).count()
    }

    pub fn failed(&self) -> usize {
        self.devices.len() - self.succeeded()
    }
}

/// Runs rollups over a device list with bounded concurrency.
#[derive(Debug, Clone)]
pub struct Trigger {
    engine: RollupEngine,
    concurrency: usize,
}

impl Trigger {
    pub fn new(engine: RollupEngine, concurrency: usize) -> Self {
        Self {
            engine,
            concurrency: concurrency.max(1),
        }
    }

    /// Resolve `request` against `today` and run it.
    pub async fn run_request(
        &self,
        devices: &[String],
        request: TriggerRequest,
        today: Date,
    ) -> Result<TriggerSummary> {
        let start = request.resolve(today)?;
        Ok(self.run(devices, request.granularity, start).await)
    }

    /// Roll up the period of `granularity` containing `date` for every device.
    pub async fn run(&self, devices: &[String], granularity: Granularity, date: Date) -> TriggerSummary {
        let start = granularity.align(date);
        let period = period_label(granularity, start);
        info!(
            "Running {} rollup for {} on {} device(s)",
            granularity,
            period,
            devices.len()
        );

        let mut outcomes: Vec<DeviceOutcome> = stream::iter(devices.iter().cloned())
            .map(|device| self.run_device(device, granularity, start))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        outcomes.sort_by(|a, b| a.device.cmp(&b.device));

        let summary = TriggerSummary {
            granularity,
            period,
            devices: outcomes,
        };
        info!(
            "{} rollup for {}: {} ok, {} failed",
            granularity,
            summary.period,
            summary.succeeded(),
            summary.failed()
        );
        summary
    }

    async fn run_device(&self, device: String, granularity: Granularity, start: Date) -> DeviceOutcome {
        let result = match granularity {
            Granularity::Day => self.engine.rollup_day(&device, start).await.and_then(detail),
            Granularity::Month => self
                .engine
                .rollup_full_month(&device, start)
                .await
                .and_then(detail),
            Granularity::Year => self.engine.rollup_year(&device, start).await.and_then(detail),
        };

        match result {
            Ok(detail) => DeviceOutcome {
                device,
                ok: true,
                detail,
            },
            Err(e) => {
                error!("{} rollup failed for {}: {}", granularity, device, e);
                DeviceOutcome {
                    device,
                    ok: false,
                    detail: serde_json::Value::String(e.to_string()),
                }
            }
        }
    }
}

fn detail<T: Serialize>(report: T) -> Result<serde_json::Value> {
    serde_json::to_value(report).map_err(|e| Error::Store(e.into()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use picotherm_store::{ColdStore, MockColdStore, MockHotStore};
    use picotherm_types::{Measurement, Period, Series, date_start_ms};
    use time::macros::date;

    const HOUR: i64 = 3_600_000;

    fn hourly(day: Date) -> Vec<Measurement> {
        (0..24)
            .map(|h| Measurement::new(date_start_ms(day) + h * HOUR, 20.0, 50.0))
            .collect()
    }

    fn devices(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_default_dates() {
        let today = date!(2024 - 03 - 01);
        assert_eq!(default_date(Granularity::Day, today).unwrap(), date!(2024 - 02 - 29));
        assert_eq!(default_date(Granularity::Month, today).unwrap(), date!(2024 - 02 - 01));
        assert_eq!(default_date(Granularity::Year, today).unwrap(), date!(2023 - 01 - 01));

        let new_year = date!(2025 - 01 - 01);
        assert_eq!(default_date(Granularity::Day, new_year).unwrap(), date!(2024 - 12 - 31));
        assert_eq!(default_date(Granularity::Month, new_year).unwrap(), date!(2024 - 12 - 01));
    }

    #[test]
    fn test_request_deserialize() {
        let request: TriggerRequest =
            serde_json::from_str(r#"{"granularity":"month","date":"2024-02-17"}"#).unwrap();
        assert_eq!(request.granularity, Granularity::Month);
        assert_eq!(request.resolve(date!(2024 - 06 - 01)).unwrap(), date!(2024 - 02 - 01));

        let request: TriggerRequest = serde_json::from_str(r#"{"granularity":"day"}"#).unwrap();
        assert_eq!(request.date, None);
        assert_eq!(request.resolve(date!(2024 - 06 - 01)).unwrap(), date!(2024 - 05 - 31));

        assert!(serde_json::from_str::<TriggerRequest>(r#"{"granularity":"week"}"#).is_err());
        assert!(
            serde_json::from_str::<TriggerRequest>(r#"{"granularity":"day","date":"17/02/2024"}"#)
                .is_err()
        );
    }

    #[test]
    fn test_period_labels() {
        let d = date!(2024 - 03 - 07);
        assert_eq!(period_label(Granularity::Day, d), "2024-03-07");
        assert_eq!(period_label(Granularity::Month, d), "2024-03");
        assert_eq!(period_label(Granularity::Year, d), "2024");
    }

    #[tokio::test]
    async fn test_failing_device_does_not_stop_others() {
        let hot = Arc::new(MockHotStore::new());
        let cold = Arc::new(MockColdStore::new());
        let day = date!(2024 - 03 - 07);
        for id in ["pt-a", "pt-b", "pt-c"] {
            hot.insert(id, hourly(day)).await;
        }
        cold.fail_device("pt-b").await;

        let trigger = Trigger::new(RollupEngine::new(hot, cold.clone()), 2);
        let summary = trigger
            .run(&devices(&["pt-c", "pt-b", "pt-a"]), Granularity::Day, day)
            .await;

        assert_eq!(summary.period, "2024-03-07");
        assert_eq!(summary.succeeded(), 2);
        assert_eq!(summary.failed(), 1);
        let ids: Vec<&str> = summary.devices.iter().map(|d| d.device.as_str()).collect();
        assert_eq!(ids, vec!["pt-a", "pt-b", "pt-c"]);
        assert!(!summary.devices[1].ok);
        assert!(summary.devices[1].detail.as_str().unwrap().contains("pt-b"));
        assert_eq!(summary.devices[0].detail["points"], 24);

        assert!(cold.get(&Period::day("pt-c", day)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_year_trigger_reports_missing_month() {
        let cold = Arc::new(MockColdStore::new());
        cold.put(
            &Period::month("pt-1", date!(2023 - 01 - 01)),
            &Series::new(hourly(date!(2023 - 01 - 01))).unwrap(),
        )
        .await
        .unwrap();
        let trigger = Trigger::new(RollupEngine::new(Arc::new(MockHotStore::new()), cold), 4);

        let summary = trigger
            .run_request(
                &devices(&["pt-1"]),
                TriggerRequest::new(Granularity::Year, None),
                date!(2024 - 01 - 01),
            )
            .await
            .unwrap();

        assert_eq!(summary.period, "2023");
        assert_eq!(summary.failed(), 1);
        assert!(summary.devices[0].detail.as_str().unwrap().contains("2023-02"));
    }

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: serde::Serializer>(&self, _: S) -> std::result::Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("report refused"))
        }
    }

    #[test]
    fn test_unserializable_report_is_an_error() {
        let err = detail(Unserializable).unwrap_err();
        assert!(matches!(err, Error::Store(_)));
        assert!(err.to_string().contains("report refused"));
    }

    #[tokio::test]
    async fn test_summary_serializes() {
        let trigger = Trigger::new(
            RollupEngine::new(Arc::new(MockHotStore::new()), Arc::new(MockColdStore::new())),
            1,
        );
        let summary = trigger
            .run(&devices(&["pt-1"]), Granularity::Month, date!(2024 - 02 - 10))
            .await;

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["granularity"], "month");
        assert_eq!(json["period"], "2024-02");
        assert_eq!(json["devices"][0]["ok"], true);
        assert_eq!(json["devices"][0]["detail"]["written"], false);
    }
}
