//! Background schedule running the rollups as each UTC day closes.

use std::sync::Arc;
use std::time::Duration;

use time::{Date, Month};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use picotherm_types::Granularity;

use crate::state::AppState;
use crate::trigger::{TriggerSummary, default_date};

/// How often the clock is checked for a day change.
pub const CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Runs the day rollup after every UTC midnight, plus the month rollup on the
/// first of a month and the year rollup on January 1st.
pub struct Scheduler {
    state: Arc<AppState>,
}

impl Scheduler {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Spawn the schedule loop. Nothing runs until the first day change.
    pub fn start(self) -> JoinHandle<()> {
        let mut last_day = self.state.clock.today();
        info!("Rollup schedule started on {}", last_day);

        tokio::spawn(async move {
            let mut timer = interval(CHECK_INTERVAL);
            loop {
                timer.tick().await;
                self.run_due(&mut last_day).await;
            }
        })
    }

    /// Run whatever became due since `last_day`, then advance it to today.
    pub async fn run_due(&self, last_day: &mut Date) -> Vec<TriggerSummary> {
        let today = self.state.clock.today();
        if today <= *last_day {
            return Vec::new();
        }
        if (today - *last_day).whole_days() > 1 {
            warn!(
                "Schedule skipped from {} to {}; use backfill for the days in between",
                last_day, today
            );
        }
        *last_day = today;

        let devices = match self.state.device_ids().await {
            Ok(devices) => devices,
            Err(e) => {
                error!("Scheduled rollups skipped, cannot list devices: {}", e);
                return Vec::new();
            }
        };
        if devices.is_empty() {
            debug!("No devices to roll up");
            return Vec::new();
        }

        let trigger = self.state.trigger();
        let mut summaries = Vec::new();
        for granularity in Granularity::ALL {
            if !is_due(granularity, today) {
                continue;
            }
            match default_date(granularity, today) {
                Ok(date) => summaries.push(trigger.run(&devices, granularity, date).await),
                Err(e) => error!("Cannot schedule {} rollup: {}", granularity, e),
            }
        }
        summaries
    }
}

fn is_due(granularity: Granularity, today: Date) -> bool {
    match granularity {
        Granularity::Day => true,
        Granularity::Month => today.day() == 1,
        Granularity::Year => today.day() == 1 && today.month() == Month::January,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use picotherm_core::FixedClock;
    use picotherm_store::{MockColdStore, MockHotStore};
    use picotherm_types::Measurement;
    use time::macros::{date, datetime};

    use crate::config::Config;

    async fn state(clock: Arc<FixedClock>) -> Arc<AppState> {
        let hot = Arc::new(MockHotStore::new());
        hot.insert("pt-1", vec![Measurement::new(0, 1.0, 1.0)]).await;
        AppState::new(Config::default(), hot, Arc::new(MockColdStore::new()), clock)
    }

    fn runs(summaries: &[TriggerSummary]) -> Vec<String> {
        summaries
            .iter()
            .map(|s| format!("{} {}", s.granularity, s.period))
            .collect()
    }

    #[tokio::test]
    async fn test_nothing_due_on_same_day() {
        let clock = Arc::new(FixedClock::at_noon(date!(2024 - 03 - 07)));
        let scheduler = Scheduler::new(state(clock).await);

        let mut last = date!(2024 - 03 - 07);
        assert!(scheduler.run_due(&mut last).await.is_empty());
    }

    #[tokio::test]
    async fn test_day_change_runs_due_rollups() {
        let clock = Arc::new(FixedClock::at_noon(date!(2024 - 03 - 07)));
        let scheduler = Scheduler::new(state(clock.clone()).await);
        let mut last = date!(2024 - 03 - 06);

        assert_eq!(runs(&scheduler.run_due(&mut last).await), vec!["day 2024-03-06"]);
        assert_eq!(last, date!(2024 - 03 - 07));
        assert!(scheduler.run_due(&mut last).await.is_empty());

        clock.set(datetime!(2024-04-01 0:01 UTC));
        assert_eq!(
            runs(&scheduler.run_due(&mut last).await),
            vec!["day 2024-03-31", "month 2024-03"]
        );

        last = date!(2024 - 12 - 31);
        clock.set(datetime!(2025-01-01 0:01 UTC));
        assert_eq!(
            runs(&scheduler.run_due(&mut last).await),
            vec!["day 2024-12-31", "month 2024-12", "year 2024"]
        );
    }
}
