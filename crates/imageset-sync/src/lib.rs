//! Keeps `ClusterImageSet` records in sync with YAML manifests stored in a
//! Git branch.
//!
//! Each cycle checks the branch head, and when it moved takes a shallow
//! snapshot, loads every manifest under `<gitRepoPath>/<channel>`, creates or
//! updates the matching records and, on cleanup-eligible cycles, deletes
//! sync-managed records that disappeared upstream.

pub mod config;
pub mod db;
pub mod error;
pub mod imageset;
pub mod sanitize;
pub mod secrets;
pub mod source;
pub mod store;
pub mod sync;

pub use config::{FileSettingsProvider, SettingsProvider, SyncSettings};
pub use db::{Database, DatabaseError, SqliteImageSetStore};
pub use error::{Result, SyncError};
pub use imageset::{ClusterImageSet, ManifestLoader};
pub use secrets::{resolve_secret, resolve_secret_optional, SecretError};
pub use source::{GitSource, RepositorySource, Snapshot, SourceProvider};
pub use store::{ImageSetStore, MemoryStore, StoreError};
pub use sync::{CleanupPolicy, CycleEvent, CyclePhase, CycleReport, ImageSetController, SyncScheduler};
