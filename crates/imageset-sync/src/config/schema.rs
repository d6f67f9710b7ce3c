//! Settings file schema.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::sync::CleanupPolicy;

pub const DEFAULT_REPO_URL: &str = "https://github.com/stolostron/acm-hive-openshift-releases.git";
pub const DEFAULT_BRANCH: &str = "backplane-2.2";
pub const DEFAULT_PATH: &str = "clusterImageSets";
pub const DEFAULT_CHANNEL: &str = "fast";
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_TRANSPORT_TIMEOUT_SECS: u64 = 120;

/// Top-level sync settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSettings {
    /// Git repository holding the manifests.
    #[serde(default = "default_repo_url")]
    pub git_repo_url: String,

    /// Branch to track.
    #[serde(default = "default_branch")]
    pub git_repo_branch: String,

    /// Directory in the repository containing one directory per channel.
    #[serde(default = "default_path")]
    pub git_repo_path: String,

    /// Channel directory to sync, e.g. `fast` or `stable`.
    #[serde(default = "default_channel")]
    pub channel: String,

    /// Seconds between the end of one cycle and the start of the next.
    #[serde(default = "default_sync_interval")]
    pub sync_interval: u64,

    #[serde(default)]
    pub cleanup: CleanupPolicy,

    /// Extra PEM certificates to trust for the repository host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_certs: Option<String>,

    #[serde(default)]
    pub insecure_skip_verify: bool,

    #[serde(default)]
    pub auth: AuthSettings,

    #[serde(default)]
    pub transport: TransportSettings,

    #[serde(default)]
    pub store: StoreSettings,
}

fn default_repo_url() -> String {
    DEFAULT_REPO_URL.to_string()
}

fn default_branch() -> String {
    DEFAULT_BRANCH.to_string()
}

fn default_path() -> String {
    DEFAULT_PATH.to_string()
}

fn default_channel() -> String {
    DEFAULT_CHANNEL.to_string()
}

fn default_sync_interval() -> u64 {
    DEFAULT_SYNC_INTERVAL_SECS
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            git_repo_url: default_repo_url(),
            git_repo_branch: default_branch(),
            git_repo_path: default_path(),
            channel: default_channel(),
            sync_interval: default_sync_interval(),
            cleanup: CleanupPolicy::default(),
            ca_certs: None,
            insecure_skip_verify: false,
            auth: AuthSettings::default(),
            transport: TransportSettings::default(),
            store: StoreSettings::default(),
        }
    }
}

impl SyncSettings {
    /// Replaces empty or blank values with their defaults.
    pub fn normalized(mut self) -> Self {
        fn fill(value: &mut String, default: &str) {
            if value.trim().is_empty() {
                *value = default.to_string();
            } else {
                *value = value.trim().to_string();
            }
        }

        fill(&mut self.git_repo_url, DEFAULT_REPO_URL);
        fill(&mut self.git_repo_branch, DEFAULT_BRANCH);
        fill(&mut self.git_repo_path, DEFAULT_PATH);
        fill(&mut self.channel, DEFAULT_CHANNEL);
        if self.sync_interval == 0 {
            self.sync_interval = DEFAULT_SYNC_INTERVAL_SECS;
        }
        self
    }
}

/// Repository credentials.
///
/// HTTPS basic auth is used only when both `user` and a token are present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSettings {
    #[serde(default)]
    pub user: String,

    /// Direct token value.
    /// WARNING: This stores the token in plaintext in the settings file.
    /// Prefer access_token_file or access_token_env_var.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        alias = "accessToken"
    )]
    pub access_token_insecure: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token_file: Option<String>,

    #[serde(default)]
    pub access_token_env_var: String,

    /// Private key for `git@` remotes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_key_path: Option<String>,

    /// Client certificate for mutual TLS. Requires `client_key_file`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_cert_file: Option<String>,

    /// Client key for mutual TLS. Requires `client_cert_file`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_key_file: Option<String>,
}

/// Limits applied to git calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportSettings {
    /// Per-call timeout in seconds. `0` disables the limit.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    DEFAULT_TRANSPORT_TIMEOUT_SECS
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
        }
    }
}

/// Where records are persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSettings {
    /// SQLite database file. Records are kept in memory when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
}
