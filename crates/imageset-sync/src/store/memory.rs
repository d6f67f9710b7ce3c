//! In-memory image set store.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use serde::Serialize;

use super::{ImageSetStore, StoreError};
use crate::imageset::ClusterImageSet;

/// Number of write calls that reached the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub creates: usize,
    pub updates: usize,
    pub deletes: usize,
}

#[derive(Default)]
struct Inner {
    records: BTreeMap<String, ClusterImageSet>,
    stats: StoreStats,
}

/// Store that keeps records in process memory.
///
/// Used for dry runs and as the reference backend in tests.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with records, bypassing the counters.
    pub fn with_records(records: impl IntoIterator<Item = ClusterImageSet>) -> Self {
        let store = Self::new();
        {
            let mut inner = store.inner.lock().unwrap_or_else(|e| e.into_inner());
            for record in records {
                let record = stamp_new(record);
                inner.records.insert(record.name().to_string(), record);
            }
        }
        store
    }

    /// Returns the write counters.
    pub fn stats(&self) -> StoreStats {
        self.lock().map(|inner| inner.stats).unwrap_or_default()
    }

    /// Returns the names of all stored records, sorted.
    pub fn names(&self) -> Vec<String> {
        self.lock()
            .map(|inner| inner.records.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))
    }
}

fn stamp_new(mut record: ClusterImageSet) -> ClusterImageSet {
    record.metadata.uid = Some(uuid::Uuid::new_v4().to_string());
    record.metadata.resource_version = Some(1);
    record.metadata.creation_timestamp = Some(Utc::now());
    record
}

impl ImageSetStore for MemoryStore {
    fn get(&self, name: &str) -> Result<Option<ClusterImageSet>, StoreError> {
        Ok(self.lock()?.records.get(name).cloned())
    }

    fn create(&self, imageset: &ClusterImageSet) -> Result<ClusterImageSet, StoreError> {
        let mut inner = self.lock()?;
        if inner.records.contains_key(imageset.name()) {
            return Err(StoreError::AlreadyExists(imageset.name().to_string()));
        }

        let record = stamp_new(imageset.clone());
        inner
            .records
            .insert(record.name().to_string(), record.clone());
        inner.stats.creates += 1;
        Ok(record)
    }

    fn update(
        &self,
        name: &str,
        imageset: &ClusterImageSet,
    ) -> Result<ClusterImageSet, StoreError> {
        let mut inner = self.lock()?;
        let existing = inner
            .records
            .get(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;

        let current = existing.metadata.resource_version.unwrap_or(0);
        if let Some(expected) = imageset.metadata.resource_version {
            if expected != current {
                return Err(StoreError::Conflict {
                    name: name.to_string(),
                    expected,
                    actual: current,
                });
            }
        }

        let mut record = imageset.clone();
        record.metadata.name = name.to_string();
        record.metadata.uid = existing.metadata.uid.clone();
        record.metadata.creation_timestamp = existing.metadata.creation_timestamp;
        record.metadata.resource_version = Some(current + 1);

        inner.records.insert(name.to_string(), record.clone());
        inner.stats.updates += 1;
        Ok(record)
    }

    fn list(&self) -> Result<Vec<ClusterImageSet>, StoreError> {
        Ok(self.lock()?.records.values().cloned().collect())
    }

    fn delete(&self, name: &str) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        if inner.records.remove(name).is_none() {
            return Err(StoreError::NotFound(name.to_string()));
        }
        inner.stats.deletes += 1;
        Ok(())
    }
}
