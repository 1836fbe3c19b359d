//! Replaying a trigger over a span of past periods.

use time::Date;
use tracing::info;

use picotherm_core::{Error, Result};
use picotherm_types::{Granularity, date_start_ms};

use crate::trigger::{Trigger, TriggerSummary};

/// Run `trigger` once per period of `granularity` from the period containing
/// `from` through the one containing `to`, oldest first.
///
/// Periods run one after another. Day backfills in ascending order build the
/// month and year blobs through the normal append path; month and year
/// backfills rebuild from blobs that must already exist.
pub async fn backfill(
    trigger: &Trigger,
    devices: &[String],
    granularity: Granularity,
    from: Date,
    to: Date,
) -> Result<Vec<TriggerSummary>> {
    let mut start = granularity.align(from);
    let last = granularity.align(to);
    if start > last {
        return Err(Error::InvalidRange {
            start_ms: date_start_ms(from),
            end_ms: date_start_ms(to),
        });
    }

    info!("Backfilling {} rollups from {} to {}", granularity, start, last);
    let mut summaries = Vec::new();
    loop {
        summaries.push(trigger.run(devices, granularity, start).await);
        if start >= last {
            break;
        }
        start = granularity.next_start(start)?;
    }

    let failed: usize = summaries.iter().map(TriggerSummary::failed).sum();
    info!(
        "Backfill done: {} period(s), {} device failure(s)",
        summaries.len(),
        failed
    );
    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use picotherm_core::RollupEngine;
    use picotherm_store::{ColdStore, MockColdStore, MockHotStore};
    use picotherm_types::{Measurement, Period};
    use time::macros::date;

    fn setup() -> (Arc<MockHotStore>, Arc<MockColdStore>, Trigger) {
        let hot = Arc::new(MockHotStore::new());
        let cold = Arc::new(MockColdStore::new());
        let trigger = Trigger::new(RollupEngine::new(hot.clone(), cold.clone()), 4);
        (hot, cold, trigger)
    }

    #[tokio::test]
    async fn test_day_backfill_builds_month_and_year() {
        let (hot, cold, trigger) = setup();
        let points: Vec<Measurement> = (0..6)
            .map(|i| Measurement::new(date_start_ms(date!(2024 - 01 - 30)) + i * 43_200_000, 1.0, 2.0))
            .collect();
        hot.insert("pt-1", points).await;

        let summaries = backfill(
            &trigger,
            &["pt-1".to_string()],
            Granularity::Day,
            date!(2024 - 01 - 30),
            date!(2024 - 02 - 01),
        )
        .await
        .unwrap();

        let periods: Vec<&str> = summaries.iter().map(|s| s.period.as_str()).collect();
        assert_eq!(periods, vec!["2024-01-30", "2024-01-31", "2024-02-01"]);
        assert!(summaries.iter().all(|s| s.failed() == 0));

        let year = cold
            .get(&Period::year("pt-1", date!(2024 - 01 - 01)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(year.len(), 6);
        let feb = cold
            .get(&Period::month("pt-1", date!(2024 - 02 - 01)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(feb.len(), 2);
    }

    #[tokio::test]
    async fn test_month_backfill_aligns_bounds() {
        let (_hot, _cold, trigger) = setup();
        let summaries = backfill(
            &trigger,
            &["pt-1".to_string()],
            Granularity::Month,
            date!(2023 - 11 - 20),
            date!(2024 - 01 - 05),
        )
        .await
        .unwrap();

        let periods: Vec<&str> = summaries.iter().map(|s| s.period.as_str()).collect();
        assert_eq!(periods, vec!["2023-11", "2023-12", "2024-01"]);
    }

    #[tokio::test]
    async fn test_inverted_span_is_rejected() {
        let (_hot, cold, trigger) = setup();
        let err = backfill(
            &trigger,
            &["pt-1".to_string()],
            Granularity::Day,
            date!(2024 - 02 - 02),
            date!(2024 - 02 - 01),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::InvalidRange { .. }));
        assert_eq!(cold.put_count(), 0);
    }
}
