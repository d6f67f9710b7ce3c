//! Persistence interface for cluster image sets.
//!
//! The sync engine only talks to an [`ImageSetStore`]. Two backends ship
//! with the crate: [`MemoryStore`] and the SQLite-backed
//! [`crate::db::SqliteImageSetStore`].

use thiserror::Error;

use crate::imageset::ClusterImageSet;

pub mod memory;

pub use memory::{MemoryStore, StoreStats};

/// Errors from store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Cluster image set not found: {0}")]
    NotFound(String),

    #[error("Cluster image set already exists: {0}")]
    AlreadyExists(String),

    #[error("Conflict updating '{name}': expected version {expected}, found {actual}")]
    Conflict {
        name: String,
        expected: u64,
        actual: u64,
    },

    #[error("Store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Returns true for the "no such record" case.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Synchronous CRUD over the managed collection.
///
/// Calls are blocking and never retried internally; any error is surfaced
/// to the caller immediately.
pub trait ImageSetStore: Send + Sync {
    /// Looks up a record by name. `Ok(None)` when it does not exist.
    fn get(&self, name: &str) -> Result<Option<ClusterImageSet>, StoreError>;

    /// Persists a new record. The store assigns uid, version and timestamp.
    fn create(&self, imageset: &ClusterImageSet) -> Result<ClusterImageSet, StoreError>;

    /// Replaces an existing record.
    ///
    /// When `imageset.metadata.resource_version` is set it must match the
    /// stored version.
    fn update(&self, name: &str, imageset: &ClusterImageSet)
        -> Result<ClusterImageSet, StoreError>;

    /// Returns every record in the collection.
    fn list(&self) -> Result<Vec<ClusterImageSet>, StoreError>;

    /// Removes a record.
    fn delete(&self, name: &str) -> Result<(), StoreError>;
}

impl<S: ImageSetStore + ?Sized> ImageSetStore for std::sync::Arc<S> {
    fn get(&self, name: &str) -> Result<Option<ClusterImageSet>, StoreError> {
        (**self).get(name)
    }

    fn create(&self, imageset: &ClusterImageSet) -> Result<ClusterImageSet, StoreError> {
        (**self).create(imageset)
    }

    fn update(
        &self,
        name: &str,
        imageset: &ClusterImageSet,
    ) -> Result<ClusterImageSet, StoreError> {
        (**self).update(name, imageset)
    }

    fn list(&self) -> Result<Vec<ClusterImageSet>, StoreError> {
        (**self).list()
    }

    fn delete(&self, name: &str) -> Result<(), StoreError> {
        (**self).delete(name)
    }
}
