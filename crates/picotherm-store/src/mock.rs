//! In-memory mock stores for testing.
//!
//! [`MockHotStore`] and [`MockColdStore`] implement the storage traits
//! without touching disk, so rollup and query logic can be tested in
//! isolation.
//!
//! # Features
//!
//! - **Failure injection**: fail every call, or only calls for specific
//!   devices
//! - **Call counting**: assert how many fetches a plan actually issued
//! - **Raw blob access**: plant corrupt bytes, or compare blobs byte-for-byte

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use picotherm_types::codec;
use picotherm_types::{Measurement, Period, Series};

use crate::error::{Error, Result};
use crate::traits::{ColdStore, HotStore};

/// Shared failure switches used by both mocks.
#[derive(Debug)]
struct FailureControl {
    should_fail: AtomicBool,
    fail_message: RwLock<String>,
    failing_devices: RwLock<HashSet<String>>,
}

impl FailureControl {
    fn new() -> Self {
        Self {
            should_fail: AtomicBool::new(false),
            fail_message: RwLock::new("Mock failure".to_string()),
            failing_devices: RwLock::new(HashSet::new()),
        }
    }

    async fn check(&self, device: &str) -> Result<()> {
        if self.failing_devices.read().await.contains(device) {
            return Err(Error::Unavailable(format!(
                "{} (device {})",
                self.fail_message.read().await,
                device
            )));
        }

        if self.should_fail.load(Ordering::Relaxed) {
            Err(Error::Unavailable(self.fail_message.read().await.clone()))
        } else {
            Ok(())
        }
    }

    async fn set_should_fail(&self, fail: bool, message: Option<&str>) {
        self.should_fail.store(fail, Ordering::Relaxed);
        if let Some(msg) = message {
            *self.fail_message.write().await = msg.to_string();
        }
    }
}

/// A mock hot store holding readings in memory.
///
/// # Example
///
/// ```
/// use picotherm_store::{HotStore, MockHotStore};
/// use picotherm_types::Measurement;
///
/// #[tokio::main]
/// async fn main() {
///     let store = MockHotStore::new();
///     store
///         .insert("pt-1", vec![Measurement::new(1_000, 21.0, 40.0)])
///         .await;
///     let series = store.query("pt-1", 0, 2_000).await.unwrap();
///     assert_eq!(series.len(), 1);
/// }
/// ```
#[derive(Debug)]
pub struct MockHotStore {
    readings: RwLock<HashMap<String, BTreeMap<i64, Measurement>>>,
    query_count: AtomicU32,
    failures: FailureControl,
}

impl Default for MockHotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHotStore {
    /// Create an empty mock hot store.
    pub fn new() -> Self {
        Self {
            readings: RwLock::new(HashMap::new()),
            query_count: AtomicU32::new(0),
            failures: FailureControl::new(),
        }
    }

    /// Add readings for a device. A timestamp already present is replaced.
    pub async fn insert(&self, device: &str, measurements: Vec<Measurement>) {
        let mut readings = self.readings.write().await;
        let entry = readings.entry(device.to_string()).or_default();
        for m in measurements {
            entry.insert(m.timestamp_ms, m);
        }
    }

    /// Make every call fail (or stop failing).
    pub async fn set_should_fail(&self, fail: bool, message: Option<&str>) {
        self.failures.set_should_fail(fail, message).await;
    }

    /// Fail every call that concerns `device`.
    pub async fn fail_device(&self, device: &str) {
        self.failures
            .failing_devices
            .write()
            .await
            .insert(device.to_string());
    }

    /// Number of `query` calls served so far (including failed ones).
    pub fn query_count(&self) -> u32 {
        self.query_count.load(Ordering::Relaxed)
    }

    /// Reset the query counter.
    pub fn reset_query_count(&self) {
        self.query_count.store(0, Ordering::Relaxed);
    }
}

#[async_trait]
impl HotStore for MockHotStore {
    async fn query(&self, device: &str, start_ms: i64, end_ms: i64) -> Result<Series> {
        self.query_count.fetch_add(1, Ordering::Relaxed);
        self.failures.check(device).await?;

        if start_ms >= end_ms {
            return Ok(Series::empty());
        }
        let readings = self.readings.read().await;
        let points: Vec<Measurement> = readings
            .get(device)
            .map(|rows| rows.range(start_ms..end_ms).map(|(_, m)| *m).collect())
            .unwrap_or_default();
        Series::new(points).map_err(|source| Error::Corrupt {
            key: format!("hot:{}", device),
            source,
        })
    }

    async fn latest(&self, device: &str) -> Result<Option<Measurement>> {
        self.failures.check(device).await?;
        let readings = self.readings.read().await;
        Ok(readings
            .get(device)
            .and_then(|rows| rows.last_key_value())
            .map(|(_, m)| *m))
    }

    async fn devices(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.readings.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

/// A mock cold store keeping encoded blobs in memory.
///
/// Blobs are stored encoded, exactly as a real backend would hold them, so
/// [`raw`](Self::raw) can be used to check that a blob was left
/// byte-for-byte unchanged.
#[derive(Debug)]
pub struct MockColdStore {
    blobs: RwLock<HashMap<String, Bytes>>,
    get_count: AtomicU32,
    put_count: AtomicU32,
    failures: FailureControl,
}

impl Default for MockColdStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MockColdStore {
    /// Create an empty mock cold store.
    pub fn new() -> Self {
        Self {
            blobs: RwLock::new(HashMap::new()),
            get_count: AtomicU32::new(0),
            put_count: AtomicU32::new(0),
            failures: FailureControl::new(),
        }
    }

    /// Store raw bytes under `key`, bypassing the codec.
    pub async fn put_raw(&self, key: impl Into<String>, data: Bytes) {
        self.blobs.write().await.insert(key.into(), data);
    }

    /// Raw bytes stored under `key`.
    pub async fn raw(&self, key: &str) -> Option<Bytes> {
        self.blobs.read().await.get(key).cloned()
    }

    /// All stored keys, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.blobs.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Make every call fail (or stop failing).
    pub async fn set_should_fail(&self, fail: bool, message: Option<&str>) {
        self.failures.set_should_fail(fail, message).await;
    }

    /// Fail every call for periods of `device`.
    pub async fn fail_device(&self, device: &str) {
        self.failures
            .failing_devices
            .write()
            .await
            .insert(device.to_string());
    }

    /// Number of `get` calls served so far.
    pub fn get_count(&self) -> u32 {
        self.get_count.load(Ordering::Relaxed)
    }

    /// Number of `put` calls served so far.
    pub fn put_count(&self) -> u32 {
        self.put_count.load(Ordering::Relaxed)
    }

    /// Reset both call counters.
    pub fn reset_counts(&self) {
        self.get_count.store(0, Ordering::Relaxed);
        self.put_count.store(0, Ordering::Relaxed);
    }
}

#[async_trait]
impl ColdStore for MockColdStore {
    async fn get(&self, period: &Period) -> Result<Option<Series>> {
        self.get_count.fetch_add(1, Ordering::Relaxed);
        self.failures.check(&period.device).await?;

        let key = period.key();
        let Some(data) = self.raw(&key).await else {
            return Ok(None);
        };
        codec::decode(&data)
            .map(Some)
            .map_err(|source| Error::Corrupt { key, source })
    }

    async fn put(&self, period: &Period, series: &Series) -> Result<()> {
        self.put_count.fetch_add(1, Ordering::Relaxed);
        self.failures.check(&period.device).await?;
        let blob = codec::encode(series).map_err(|source| Error::Encode {
            key: period.key(),
            source,
        })?;
        self.put_raw(period.key(), blob).await;
        Ok(())
    }
}
