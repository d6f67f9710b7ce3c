//! Fake repository source.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use imageset_sync::error::{Result, SyncError};
use imageset_sync::source::{RepositorySource, Snapshot, SourceProvider};

#[derive(Default)]
struct Branch {
    revision: String,
    /// Files relative to the repository root.
    files: BTreeMap<PathBuf, Vec<u8>>,
    unreachable: bool,
}

/// A branch held in memory. `snapshot` writes its files into the
/// destination directory.
#[derive(Default)]
pub struct FakeUpstream {
    branch: Mutex<Branch>,
    lookups: AtomicUsize,
    snapshots: AtomicUsize,
}

impl FakeUpstream {
    pub fn new() -> Self {
        let upstream = Self::default();
        upstream.commit("rev-1");
        upstream
    }

    /// Moves the head to `revision`.
    pub fn commit(&self, revision: &str) {
        self.branch.lock().unwrap().revision = revision.to_string();
    }

    /// Adds or replaces a file at `path` relative to the repository root.
    pub fn put(&self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) {
        self.branch
            .lock()
            .unwrap()
            .files
            .insert(path.into(), contents.into());
    }

    /// Adds a manifest under `clusterImageSets/fast/<file>`.
    pub fn put_manifest(&self, file: &str, contents: impl Into<Vec<u8>>) {
        self.put(Path::new("clusterImageSets/fast").join(file), contents);
    }

    pub fn remove(&self, path: impl AsRef<Path>) {
        self.branch.lock().unwrap().files.remove(path.as_ref());
    }

    pub fn remove_manifest(&self, file: &str) {
        self.remove(Path::new("clusterImageSets/fast").join(file));
    }

    /// Makes every call fail with a network error.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.branch.lock().unwrap().unreachable = unreachable;
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn snapshots(&self) -> usize {
        self.snapshots.load(Ordering::SeqCst)
    }
}

fn unreachable_error() -> SyncError {
    SyncError::GitNetwork("Could not resolve host: git.example.com".to_string())
}

#[async_trait]
impl SourceProvider for FakeUpstream {
    async fn revision_of(&self, _source: &RepositorySource) -> Result<String> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let branch = self.branch.lock().unwrap();
        if branch.unreachable {
            return Err(unreachable_error());
        }
        Ok(branch.revision.clone())
    }

    async fn snapshot(&self, _source: &RepositorySource, dest: &Path) -> Result<Snapshot> {
        self.snapshots.fetch_add(1, Ordering::SeqCst);
        let branch = self.branch.lock().unwrap();
        if branch.unreachable {
            return Err(unreachable_error());
        }

        std::fs::create_dir_all(dest).unwrap();
        for (path, contents) in &branch.files {
            let target = dest.join(path);
            std::fs::create_dir_all(target.parent().unwrap()).unwrap();
            std::fs::write(target, contents).unwrap();
        }
        Ok(Snapshot {
            root: dest.to_path_buf(),
            revision: branch.revision.clone(),
        })
    }
}
