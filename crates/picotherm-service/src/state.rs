//! Application state shared across handlers, triggers, and the scheduler.

use std::sync::Arc;

use tracing::info;

use picotherm_core::{Clock, RangeQuery, RollupEngine, SystemClock};
use picotherm_store::{ColdStore, HotStore, ObjectColdStore, SqliteHotStore};

use crate::config::Config;
use crate::registry::{DeviceEntry, DeviceRegistry};
use crate::trigger::Trigger;

/// Shared application state.
///
/// Everything here is read-only after construction; the stores do their own
/// synchronisation.
pub struct AppState {
    /// Configuration the state was built from.
    pub config: Config,
    /// Registered devices.
    pub registry: DeviceRegistry,
    /// Hot store, used directly when no devices are registered.
    pub hot: Arc<dyn HotStore>,
    /// Rollup engine over the hot and cold stores.
    pub engine: RollupEngine,
    /// Range query over the hot and cold stores.
    pub query: RangeQuery,
    /// Source of "today".
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Build state over already-open stores.
    pub fn new(
        config: Config,
        hot: Arc<dyn HotStore>,
        cold: Arc<dyn ColdStore>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let engine = RollupEngine::new(Arc::clone(&hot), Arc::clone(&cold));
        let query = RangeQuery::new(Arc::clone(&hot), cold, Arc::clone(&clock), config.planner);
        Arc::new(Self {
            registry: DeviceRegistry::new(config.devices.clone()),
            config,
            hot,
            engine,
            query,
            clock,
        })
    }

    /// Open the SQLite hot store and the local blob store named by `config`,
    /// registering the configured devices in the hot store.
    pub async fn open(config: Config) -> picotherm_store::Result<Arc<Self>> {
        info!("Opening hot store at {:?}", config.storage.hot_path);
        let hot = SqliteHotStore::open(&config.storage.hot_path)?;
        for device in &config.devices {
            hot.upsert_device(&device.id, device.location.as_deref())
                .await?;
        }

        info!("Opening cold store at {:?}", config.storage.cold_path);
        let cold = ObjectColdStore::local(&config.storage.cold_path)?;

        Ok(Self::new(
            config,
            Arc::new(hot),
            Arc::new(cold),
            Arc::new(SystemClock),
        ))
    }

    /// Registered devices, or every device the hot store knows of when none
    /// are registered.
    pub async fn devices(&self) -> picotherm_store::Result<Vec<DeviceEntry>> {
        if !self.registry.is_empty() {
            return Ok(self.registry.entries());
        }
        Ok(self
            .hot
            .devices()
            .await?
            .into_iter()
            .map(|id| DeviceEntry { id, location: None })
            .collect())
    }

    /// Ids of [`devices`](Self::devices).
    pub async fn device_ids(&self) -> picotherm_store::Result<Vec<String>> {
        Ok(self.devices().await?.into_iter().map(|d| d.id).collect())
    }

    /// A trigger runner using the configured concurrency.
    pub fn trigger(&self) -> Trigger {
        Trigger::new(self.engine.clone(), self.config.rollup.concurrency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use picotherm_core::FixedClock;
    use picotherm_store::{MockColdStore, MockHotStore};
    use picotherm_types::Measurement;
    use time::macros::date;

    use crate::config::DeviceConfig;

    #[tokio::test]
    async fn test_devices_fall_back_to_hot_store() {
        let hot = Arc::new(MockHotStore::new());
        hot.insert("pt-9", vec![Measurement::new(0, 1.0, 1.0)]).await;
        let state = AppState::new(
            Config::default(),
            hot,
            Arc::new(MockColdStore::new()),
            Arc::new(FixedClock::at_noon(date!(2024 - 03 - 07))),
        );

        assert_eq!(state.device_ids().await.unwrap(), vec!["pt-9"]);
    }

    #[tokio::test]
    async fn test_registry_takes_precedence() {
        let hot = Arc::new(MockHotStore::new());
        hot.insert("pt-9", vec![Measurement::new(0, 1.0, 1.0)]).await;
        let mut config = Config::default();
        config.devices.push(DeviceConfig {
            id: "pt-1".into(),
            location: Some("Hall".into()),
        });
        let state = AppState::new(
            config,
            hot,
            Arc::new(MockColdStore::new()),
            Arc::new(FixedClock::at_noon(date!(2024 - 03 - 07))),
        );

        let devices = state.devices().await.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].location.as_deref(), Some("Hall"));
    }

    #[tokio::test]
    async fn test_open_creates_stores_and_registers_devices() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.hot_path = dir.path().join("db").join("hot.db");
        config.storage.cold_path = dir.path().join("cold");
        config.devices.push(DeviceConfig {
            id: "pt-1".into(),
            location: Some("Hall".into()),
        });

        let state = AppState::open(config).await.unwrap();
        assert!(dir.path().join("db").join("hot.db").exists());
        assert!(dir.path().join("cold").is_dir());
        assert_eq!(state.hot.devices().await.unwrap(), vec!["pt-1"]);
    }
}
