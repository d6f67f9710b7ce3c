//! Git CLI backed source provider.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command as TokioCommand;

use super::auth::GitEnv;
use super::parse::{format_git_error, is_object_id, parse_ls_remote};
use super::{RepositorySource, Snapshot, SourceProvider};
use crate::error::{classify_git_error, Result, SyncError};
use crate::sanitize::redact_repo_url;

/// Fetches manifests by shelling out to `git`.
///
/// `revision_of` uses `git ls-remote`; `snapshot` does a shallow,
/// single-branch clone. Credentials and TLS material are passed through
/// the environment and `-c` options, never through the URL.
#[derive(Debug, Clone)]
pub struct GitSource {
    git_binary: PathBuf,
}

impl Default for GitSource {
    fn default() -> Self {
        Self::new()
    }
}

impl GitSource {
    /// Uses `git` from `PATH`.
    pub fn new() -> Self {
        Self {
            git_binary: PathBuf::from("git"),
        }
    }

    /// Uses a specific git executable.
    pub fn with_binary(git_binary: impl Into<PathBuf>) -> Self {
        Self {
            git_binary: git_binary.into(),
        }
    }

    /// Runs git with the source's credentials and trust settings applied.
    async fn run(
        &self,
        source: &RepositorySource,
        cwd: Option<&Path>,
        args: Vec<OsString>,
    ) -> Result<Output> {
        let scratch = tempfile::Builder::new()
            .prefix("imageset-git-")
            .tempdir()
            .map_err(|source| SyncError::Io {
                path: std::env::temp_dir(),
                source,
            })?;
        let env = GitEnv::build(source, scratch.path())?;

        let mut cmd = TokioCommand::new(&self.git_binary);
        for option in &env.config {
            cmd.arg("-c").arg(option);
        }
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        for (key, value) in &env.env_vars {
            cmd.env(key, value);
        }

        let output = run_with_timeout(cmd, source.timeout).await?;
        // env (and its helper files) lives until here
        drop(env);

        if output.status.success() {
            Ok(output)
        } else {
            Err(classify_git_error(&format_git_error(&output)))
        }
    }
}

/// `--` ends option parsing so a URL starting with `-` stays positional.
fn ls_remote_args(source: &RepositorySource) -> Vec<OsString> {
    vec![
        OsString::from("ls-remote"),
        OsString::from("--"),
        OsString::from(&source.url),
        OsString::from(format!("refs/heads/{}", source.branch)),
    ]
}

fn clone_args(source: &RepositorySource, dest: &Path) -> Vec<OsString> {
    vec![
        OsString::from("clone"),
        OsString::from("--depth"),
        OsString::from("1"),
        OsString::from("--single-branch"),
        OsString::from("--no-tags"),
        OsString::from("--branch"),
        OsString::from(&source.branch),
        OsString::from("--"),
        OsString::from(&source.url),
        dest.as_os_str().to_os_string(),
    ]
}

async fn run_with_timeout(mut cmd: TokioCommand, limit: Option<Duration>) -> Result<Output> {
    let fut = cmd.output();
    let result = match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| SyncError::GitTimeout(limit.as_secs()))?,
        None => fut.await,
    };
    result.map_err(|e| SyncError::GitOperation(format!("Failed to run git: {}", e)))
}

#[async_trait]
impl SourceProvider for GitSource {
    async fn revision_of(&self, source: &RepositorySource) -> Result<String> {
        log::debug!(
            "Looking up head of {} on {}",
            source.branch,
            redact_repo_url(&source.url)
        );

        let output = self.run(source, None, ls_remote_args(source)).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);

        parse_ls_remote(&stdout, &source.branch).ok_or_else(|| {
            SyncError::GitOperation(format!(
                "Branch '{}' not found on {}",
                source.branch,
                redact_repo_url(&source.url)
            ))
        })
    }

    async fn snapshot(&self, source: &RepositorySource, dest: &Path) -> Result<Snapshot> {
        log::info!(
            "Cloning {} (branch {}) into snapshot",
            redact_repo_url(&source.url),
            source.branch
        );

        self.run(source, None, clone_args(source, dest)).await?;

        let head = self
            .run(
                source,
                Some(dest),
                vec![OsString::from("rev-parse"), OsString::from("HEAD")],
            )
            .await?;
        let revision = String::from_utf8_lossy(&head.stdout).trim().to_string();
        if !is_object_id(&revision) {
            return Err(SyncError::GitOperation(format!(
                "Unexpected rev-parse output: {}",
                revision
            )));
        }

        Ok(Snapshot {
            root: dest.to_path_buf(),
            revision,
        })
    }
}
