use std::path::Path;
use std::time::Duration;

use crate::config::schema::SyncSettings;
use crate::error::{Result, SyncError};
use crate::secrets::{expand_home, resolve_secret_optional};
use crate::source::{ClientIdentity, Credentials, RepositorySource, TrustMaterial};

/// Loads settings from a YAML file. A missing file yields the defaults.
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<SyncSettings> {
    let path = path.as_ref();
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::info!(
                "Settings file {} not found, using defaults",
                path.display()
            );
            return Ok(SyncSettings::default());
        }
        Err(e) => {
            return Err(SyncError::ConfigFetch(format!(
                "{}: {}",
                path.display(),
                e
            )))
        }
    };

    parse(&content).map_err(|e| SyncError::ConfigFetch(format!("{}: {}", path.display(), e)))
}

/// Parses settings from YAML text. Blank input yields the defaults.
pub fn load_settings_from_str(content: &str) -> Result<SyncSettings> {
    parse(content).map_err(|e| SyncError::ConfigFetch(e.to_string()))
}

fn parse(content: &str) -> std::result::Result<SyncSettings, serde_yaml::Error> {
    if content.trim().is_empty() {
        return Ok(SyncSettings::default());
    }
    let settings: SyncSettings = serde_yaml::from_str(content)?;
    Ok(settings.normalized())
}

/// Counts `CERTIFICATE` PEM blocks in a bundle.
pub fn count_pem_certificates(pem: &str) -> usize {
    pem.lines()
        .filter(|line| line.trim() == "-----BEGIN CERTIFICATE-----")
        .count()
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl SyncSettings {
    /// Resolves secrets and file references into a [`RepositorySource`].
    pub fn repository_source(&self) -> Result<RepositorySource> {
        let mut source = RepositorySource::new(
            &self.git_repo_url,
            &self.git_repo_branch,
            &self.git_repo_path,
            &self.channel,
        );

        let auth = &self.auth;
        let env_var = Some(auth.access_token_env_var.as_str()).filter(|v| !v.is_empty());
        let token = resolve_secret_optional(
            auth.access_token_insecure.as_deref(),
            auth.access_token_file.as_deref(),
            env_var,
        )
        .map_err(|e| SyncError::ConfigFetch(format!("Failed to resolve access token: {}", e)))?;

        match (auth.user.trim(), token) {
            (user, Some(token)) if !user.is_empty() => {
                source.credentials = Some(Credentials {
                    user: user.to_string(),
                    token,
                });
            }
            ("", Some(_)) => {
                log::warn!("Access token configured without a user, ignoring credentials");
            }
            _ => {}
        }

        source.ssh_key_path = non_empty(&auth.ssh_key_path).map(expand_home);

        source.trust = TrustMaterial {
            ca_certs: self.trusted_ca_bundle(),
            insecure_skip_verify: self.insecure_skip_verify,
            client_identity: self.client_identity()?,
        };

        source.timeout = match self.transport.timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Ok(source)
    }

    fn trusted_ca_bundle(&self) -> Option<String> {
        let pem = non_empty(&self.ca_certs)?;
        match count_pem_certificates(pem) {
            0 => {
                log::warn!("caCerts contains no PEM certificates, ignoring");
                None
            }
            n => {
                log::debug!("Trusting {} additional CA certificate(s)", n);
                Some(pem.to_string())
            }
        }
    }

    fn client_identity(&self) -> Result<Option<ClientIdentity>> {
        let cert = non_empty(&self.auth.client_cert_file);
        let key = non_empty(&self.auth.client_key_file);
        match (cert, key) {
            (Some(cert), Some(key)) => Ok(Some(ClientIdentity {
                cert_file: expand_home(cert),
                key_file: expand_home(key),
            })),
            (None, None) => Ok(None),
            (Some(_), None) => Err(SyncError::ConfigFetch(
                "clientCertFile is set but clientKeyFile is missing".to_string(),
            )),
            (None, Some(_)) => Err(SyncError::ConfigFetch(
                "clientKeyFile is set but clientCertFile is missing".to_string(),
            )),
        }
    }
}
