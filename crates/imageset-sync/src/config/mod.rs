//! Sync settings: schema, file loading and resolution into a
//! [`RepositorySource`](crate::source::RepositorySource).

use std::path::{Path, PathBuf};

use crate::error::Result;

pub mod loader;
pub mod schema;

pub use loader::{count_pem_certificates, load_settings, load_settings_from_str};
pub use schema::{AuthSettings, StoreSettings, SyncSettings, TransportSettings};

/// Default settings file name, relative to the working directory.
pub const DEFAULT_SETTINGS_FILE: &str = "cluster-image-set-git-repo.yaml";

/// Supplies settings at the start of every cycle, so edits take effect
/// without a restart.
pub trait SettingsProvider: Send + Sync {
    fn load(&self) -> Result<SyncSettings>;
}

/// Fixed settings.
impl SettingsProvider for SyncSettings {
    fn load(&self) -> Result<SyncSettings> {
        Ok(self.clone().normalized())
    }
}

/// Re-reads a YAML settings file on every call.
#[derive(Debug, Clone)]
pub struct FileSettingsProvider {
    path: PathBuf,
}

impl FileSettingsProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsProvider for FileSettingsProvider {
    fn load(&self) -> Result<SyncSettings> {
        load_settings(&self.path)
    }
}
