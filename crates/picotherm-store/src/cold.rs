//! Blob store for day, month, and year series, backed by `object_store`.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use object_store::ObjectStore;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use tracing::{debug, info};

use picotherm_types::codec;
use picotherm_types::{Period, Series};

use crate::error::{Error, Result};
use crate::traits::ColdStore;

/// [`ColdStore`] over any [`ObjectStore`] backend.
///
/// Each period is stored at [`Period::key`] as a codec-encoded blob.
#[derive(Debug, Clone)]
pub struct ObjectColdStore {
    store: Arc<dyn ObjectStore>,
}

impl ObjectColdStore {
    /// Wrap an existing object store.
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Blobs kept in process memory (for tests and dry runs).
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemory::new()))
    }

    /// Blobs stored as files under `root`, which is created if missing.
    pub fn local<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();
        if !root.exists() {
            std::fs::create_dir_all(root).map_err(|e| Error::CreateDirectory {
                path: root.to_path_buf(),
                source: e,
            })?;
        }
        info!("Opening cold store at {}", root.display());
        let fs = LocalFileSystem::new_with_prefix(root)?;
        Ok(Self::new(Arc::new(fs)))
    }

    /// Open the default cold store location.
    pub fn open_default() -> Result<Self> {
        Self::local(crate::default_cold_path())
    }

    /// Fetch raw blob bytes by key, `None` if absent.
    pub async fn get_raw(&self, key: &str) -> Result<Option<bytes::Bytes>> {
        let location = ObjectPath::from(key);
        match self.store.get(&location).await {
            Ok(result) => Ok(Some(result.bytes().await?)),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ColdStore for ObjectColdStore {
    async fn get(&self, period: &Period) -> Result<Option<Series>> {
        let key = period.key();
        let Some(data) = self.get_raw(&key).await? else {
            debug!("No blob for {}", period);
            return Ok(None);
        };

        let series = codec::decode(&data).map_err(|source| Error::Corrupt {
            key: key.clone(),
            source,
        })?;
        debug!("Read {} ({} points)", key, series.len());
        Ok(Some(series))
    }

    async fn put(&self, period: &Period, series: &Series) -> Result<()> {
        let key = period.key();
        let location = ObjectPath::from(key.as_str());
        let blob = codec::encode(series).map_err(|source| Error::Encode {
            key: key.clone(),
            source,
        })?;
        self.store.put(&location, blob.into()).await?;
        debug!("Wrote {} ({} points)", key, series.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use picotherm_types::Measurement;
    use time::macros::date;

    fn series(timestamps: &[i64]) -> Series {
        Series::new(
            timestamps
                .iter()
                .map(|&ts| Measurement::new(ts, 19.5, 55.0))
                .collect(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_in_memory_roundtrip() {
        let store = ObjectColdStore::in_memory();
        let period = Period::day("pt-1", date!(2024 - 03 - 07));
        let data = series(&[1, 2, 3]);

        store.put(&period, &data).await.unwrap();
        assert_eq!(store.get(&period).await.unwrap(), Some(data));
    }

    #[tokio::test]
    async fn test_missing_blob_is_none() {
        let store = ObjectColdStore::in_memory();
        let period = Period::month("pt-1", date!(2024 - 03 - 01));
        assert!(store.get(&period).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let store = ObjectColdStore::in_memory();
        let period = Period::year("pt-1", date!(2024 - 01 - 01));

        store.put(&period, &series(&[1, 2, 3])).await.unwrap();
        store.put(&period, &series(&[7])).await.unwrap();
        assert_eq!(store.get(&period).await.unwrap(), Some(series(&[7])));
    }

    #[tokio::test]
    async fn test_local_roundtrip_uses_period_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectColdStore::local(dir.path().join("cold")).unwrap();
        let period = Period::day("pt-1", date!(2024 - 03 - 07));
        let data = series(&[10, 20]);

        store.put(&period, &data).await.unwrap();
        assert!(
            dir.path()
                .join("cold/pt-1/2024/03/07/data.pts")
                .exists()
        );
        assert_eq!(store.get(&period).await.unwrap(), Some(data));
    }

    #[tokio::test]
    async fn test_empty_series_is_stored_not_absent() {
        let store = ObjectColdStore::in_memory();
        let period = Period::day("pt-1", date!(2024 - 03 - 07));

        store.put(&period, &Series::empty()).await.unwrap();
        assert_eq!(store.get(&period).await.unwrap(), Some(Series::empty()));
    }

    #[tokio::test]
    async fn test_corrupt_blob_is_reported() {
        let backend: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let store = ObjectColdStore::new(backend.clone());
        let period = Period::day("pt-1", date!(2024 - 03 - 07));

        backend
            .put(
                &ObjectPath::from(period.key().as_str()),
                bytes::Bytes::from_static(b"garbage").into(),
            )
            .await
            .unwrap();

        let err = store.get(&period).await.unwrap_err();
        assert!(err.is_corrupt());
    }
}
