//! Credential and TLS environment for git child processes.

use std::path::{Path, PathBuf};

use secrecy::ExposeSecret;

use super::{Credentials, RepositorySource, TrustMaterial};
use crate::error::{Result, SyncError};

/// Escapes a value for safe use in single-quoted shell strings.
pub fn shell_escape(value: &str) -> String {
    value.replace('\'', "'\\''")
}

/// Removes a temporary file when dropped.
///
/// Keeps the askpass script and the CA bundle from outliving the git call,
/// even when the call fails.
#[derive(Debug, Default)]
pub struct TempFileGuard {
    paths: Vec<PathBuf>,
}

impl TempFileGuard {
    fn push(&mut self, path: PathBuf) {
        self.paths.push(path);
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        for path in self.paths.drain(..) {
            if let Err(e) = std::fs::remove_file(&path) {
                log::warn!("Failed to clean up {}: {}", path.display(), e);
            }
        }
    }
}

/// Environment and `-c` options for one git invocation.
#[derive(Debug, Default)]
pub struct GitEnv {
    pub env_vars: Vec<(String, String)>,
    /// `key=value` pairs passed as `git -c key=value`.
    pub config: Vec<String>,
    /// Must outlive the git command.
    pub guard: TempFileGuard,
}

impl GitEnv {
    /// Builds the environment for `source`, writing helper files into
    /// `scratch_dir`.
    pub fn build(source: &RepositorySource, scratch_dir: &Path) -> Result<Self> {
        let mut env = GitEnv::default();
        env.env_vars
            .push(("GIT_TERMINAL_PROMPT".to_string(), "0".to_string()));

        if let Some(credentials) = &source.credentials {
            env.add_askpass(credentials, scratch_dir)?;
        }
        if let Some(key) = &source.ssh_key_path {
            env.add_ssh_key(key)?;
        }
        env.add_trust(&source.trust, scratch_dir)?;

        Ok(env)
    }

    fn add_askpass(&mut self, credentials: &Credentials, scratch_dir: &Path) -> Result<()> {
        let user = shell_escape(&credentials.user);
        let token = shell_escape(credentials.token.expose_secret());

        // git calls the helper with the prompt text as $1.
        let script = format!(
            "#!/bin/sh\ncase \"$1\" in\n  Username*) echo '{}' ;;\n  *) echo '{}' ;;\nesac\n",
            user, token
        );
        let path = scratch_dir.join(format!(".git-askpass-{}.sh", uuid::Uuid::new_v4()));
        write_private(&path, script.as_bytes(), true)?;
        self.guard.push(path.clone());

        let path_str = path
            .to_str()
            .ok_or_else(|| {
                SyncError::GitAuthFailed(
                    "Scratch directory path contains non-UTF8 characters".to_string(),
                )
            })?
            .to_string();
        self.env_vars.push(("GIT_ASKPASS".to_string(), path_str));
        Ok(())
    }

    fn add_ssh_key(&mut self, key_path: &Path) -> Result<()> {
        if !key_path.exists() {
            return Err(SyncError::GitAuthFailed(format!(
                "SSH key file not found: {}",
                key_path.display()
            )));
        }

        let display = shell_escape(&key_path.display().to_string());
        let quoted = if display.starts_with('-') {
            format!("'./{}'", display)
        } else {
            format!("'{}'", display)
        };
        self.env_vars.push((
            "GIT_SSH_COMMAND".to_string(),
            format!("ssh -i {} -o StrictHostKeyChecking=accept-new", quoted),
        ));
        Ok(())
    }

    fn add_trust(&mut self, trust: &TrustMaterial, scratch_dir: &Path) -> Result<()> {
        if trust.insecure_skip_verify {
            self.env_vars
                .push(("GIT_SSL_NO_VERIFY".to_string(), "true".to_string()));
        }

        if let Some(pem) = trust.ca_certs.as_deref().filter(|p| !p.trim().is_empty()) {
            let system = system_ca_bundle();
            let path = write_ca_bundle(scratch_dir, system.as_deref(), pem)?;
            self.guard.push(path.clone());
            self.config
                .push(format!("http.sslCAInfo={}", path.display()));
        }

        if let Some(identity) = &trust.client_identity {
            self.config
                .push(format!("http.sslCert={}", identity.cert_file.display()));
            self.config
                .push(format!("http.sslKey={}", identity.key_file.display()));
        }

        Ok(())
    }
}

/// Locates the system CA bundle (honours `SSL_CERT_FILE`).
fn system_ca_bundle() -> Option<PathBuf> {
    openssl_probe::probe().cert_file
}

/// Writes the system roots followed by `extra_pem` into one file.
///
/// `http.sslCAInfo` replaces git's trust store rather than extending it, so
/// the system roots are copied in. Without a readable system bundle only
/// `extra_pem` is trusted.
pub(crate) fn write_ca_bundle(
    scratch_dir: &Path,
    system_bundle: Option<&Path>,
    extra_pem: &str,
) -> Result<PathBuf> {
    let mut bundle = match system_bundle {
        Some(system) => match std::fs::read_to_string(system) {
            Ok(roots) => roots,
            Err(e) => {
                log::warn!(
                    "Failed to read system CA bundle {}: {}, trusting caCerts only",
                    system.display(),
                    e
                );
                String::new()
            }
        },
        None => {
            log::warn!("No system CA bundle found, trusting caCerts only");
            String::new()
        }
    };
    if !bundle.is_empty() && !bundle.ends_with('\n') {
        bundle.push('\n');
    }
    bundle.push_str(extra_pem);

    let path = scratch_dir.join(format!(".git-ca-{}.pem", uuid::Uuid::new_v4()));
    write_private(&path, bundle.as_bytes(), false)?;
    Ok(path)
}

fn write_private(path: &Path, contents: &[u8], executable: bool) -> Result<()> {
    let io_err = |source| SyncError::Io {
        path: path.to_path_buf(),
        source,
    };

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        let mode = if executable { 0o700 } else { 0o600 };
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(mode)
            .open(path)
            .map_err(io_err)?;
        std::io::Write::write_all(&mut file, contents).map_err(io_err)?;
    }

    #[cfg(not(unix))]
    {
        let _ = executable;
        std::fs::write(path, contents).map_err(io_err)?;
    }

    Ok(())
}
