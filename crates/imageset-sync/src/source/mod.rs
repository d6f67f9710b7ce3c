//! Repository sources: where manifests come from.
//!
//! The sync engine only sees a [`SourceProvider`]. [`GitSource`] is the
//! production implementation; tests plug in fakes that write files into the
//! destination directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;

use crate::error::Result;

pub mod auth;
pub mod git;
pub mod parse;

pub use git::GitSource;

/// Basic-auth credentials for HTTPS remotes.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub user: String,
    pub token: SecretString,
}

/// Client certificate and key used for mutual TLS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
}

/// TLS settings handed to the transport as plain values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustMaterial {
    /// Additional PEM certificates to trust.
    pub ca_certs: Option<String>,
    /// Skip server certificate verification.
    pub insecure_skip_verify: bool,
    pub client_identity: Option<ClientIdentity>,
}

/// Fully resolved description of what to fetch for one cycle.
#[derive(Debug, Clone)]
pub struct RepositorySource {
    pub url: String,
    pub branch: String,
    /// Directory inside the repository holding channel directories.
    pub path: String,
    pub channel: String,
    pub credentials: Option<Credentials>,
    /// Path to an SSH private key for `git@` remotes.
    pub ssh_key_path: Option<PathBuf>,
    pub trust: TrustMaterial,
    /// Upper bound for a single transport call. `None` disables the limit.
    pub timeout: Option<Duration>,
}

impl RepositorySource {
    /// Creates an anonymous source with no timeout.
    pub fn new(
        url: impl Into<String>,
        branch: impl Into<String>,
        path: impl Into<String>,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            branch: branch.into(),
            path: path.into(),
            channel: channel.into(),
            credentials: None,
            ssh_key_path: None,
            trust: TrustMaterial::default(),
            timeout: None,
        }
    }

    /// Manifest directory relative to the snapshot root: `<path>/<channel>`.
    pub fn manifest_dir(&self) -> PathBuf {
        Path::new(&self.path).join(&self.channel)
    }

    /// Returns the location this source reads manifests from.
    pub fn target(&self) -> SourceTarget {
        SourceTarget {
            url: self.url.clone(),
            branch: self.branch.clone(),
            path: self.path.clone(),
            channel: self.channel.clone(),
        }
    }
}

/// Repository, branch and manifest directory a revision was synced from.
///
/// The same revision read from a different target yields a different
/// candidate set, so a recorded revision is only valid for its target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceTarget {
    pub url: String,
    pub branch: String,
    pub path: String,
    pub channel: String,
}

/// A materialized copy of the branch at one revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub root: PathBuf,
    pub revision: String,
}

/// Fetches branch metadata and snapshots.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Returns the current head revision of the configured branch without
    /// downloading content.
    async fn revision_of(&self, source: &RepositorySource) -> Result<String>;

    /// Materializes the branch head into `dest`, which must be empty or absent.
    async fn snapshot(&self, source: &RepositorySource, dest: &Path) -> Result<Snapshot>;
}

#[async_trait]
impl<P: SourceProvider + ?Sized> SourceProvider for std::sync::Arc<P> {
    async fn revision_of(&self, source: &RepositorySource) -> Result<String> {
        (**self).revision_of(source).await
    }

    async fn snapshot(&self, source: &RepositorySource, dest: &Path) -> Result<Snapshot> {
        (**self).snapshot(source, dest).await
    }
}
