//! Manifest loader: walks a snapshot directory and parses image set files.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

use super::resource::{ClusterImageSet, KIND};
use crate::error::{Result, SyncError};

/// Raw bytes of one manifest file.
#[derive(Debug, Clone)]
pub struct RawManifest {
    /// Path of the file inside the snapshot.
    pub path: PathBuf,
    /// File contents.
    pub bytes: Vec<u8>,
}

/// Lazy depth-first sequence of manifests under a directory.
///
/// Yields one item per non-directory entry. Iteration order follows the
/// file system and must not be relied on. The first read error is yielded
/// and ends the sequence.
pub struct Manifests {
    root: PathBuf,
    /// Canonical snapshot root; symlinked entries must resolve below it.
    boundary: PathBuf,
    walker: walkdir::IntoIter,
    failed: bool,
}

impl Manifests {
    /// Returns the directory being walked.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// True for entries inside a `.git` directory. Every other file,
    /// dot-files included, is a manifest.
    fn is_vcs_metadata(&self, path: &Path) -> bool {
        path.strip_prefix(&self.root)
            .map(|relative| relative.components().any(|c| c.as_os_str() == ".git"))
            .unwrap_or(false)
    }

    /// Resolves a symlinked entry. Returns false for links to directories,
    /// which are not descended into.
    fn check_link(&self, path: &Path) -> Result<bool> {
        let target = path.canonicalize().map_err(|source| SyncError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if !target.starts_with(&self.boundary) {
            return Err(SyncError::PathTraversal(path.display().to_string()));
        }
        Ok(!target.is_dir())
    }
}

impl Iterator for Manifests {
    type Item = Result<RawManifest>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        loop {
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    self.failed = true;
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| self.root.clone());
                    let source = e
                        .into_io_error()
                        .unwrap_or_else(|| std::io::Error::other("directory walk failed"));
                    return Some(Err(SyncError::Io { path, source }));
                }
            };

            if entry.file_type().is_dir() {
                continue;
            }

            let path = entry.path();
            if self.is_vcs_metadata(path) {
                continue;
            }
            if entry.path_is_symlink() {
                match self.check_link(path) {
                    Ok(true) => {}
                    Ok(false) => {
                        log::debug!("Not following directory link {}", path.display());
                        continue;
                    }
                    Err(e) => {
                        self.failed = true;
                        return Some(Err(e));
                    }
                }
            }

            return Some(match fs::read(path) {
                Ok(bytes) => Ok(RawManifest {
                    path: path.to_path_buf(),
                    bytes,
                }),
                Err(source) => {
                    self.failed = true;
                    log::warn!("Failed to read image set file {}", path.display());
                    Err(SyncError::Io {
                        path: path.to_path_buf(),
                        source,
                    })
                }
            });
        }
    }
}

/// Loads cluster image set manifests from a snapshot.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManifestLoader;

impl ManifestLoader {
    /// Creates a new loader.
    pub fn new() -> Self {
        Self
    }

    /// Resolves `snapshot_root/relative_path` and returns a lazy sequence of
    /// the files below it.
    ///
    /// Fails if the path escapes the snapshot or the directory is missing.
    pub fn load(&self, snapshot_root: &Path, relative_path: &Path) -> Result<Manifests> {
        let dir = safe_join(snapshot_root, relative_path)?;

        let metadata = fs::metadata(&dir).map_err(|source| SyncError::Io {
            path: dir.clone(),
            source,
        })?;
        if !metadata.is_dir() {
            return Err(SyncError::Io {
                path: dir.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "manifest path is not a directory",
                ),
            });
        }

        let boundary = ensure_within(snapshot_root, &dir)?;

        Ok(Manifests {
            walker: WalkDir::new(&dir).follow_links(false).into_iter(),
            root: dir,
            boundary,
            failed: false,
        })
    }

    /// Reads and parses every manifest before returning.
    ///
    /// Nothing is returned unless every file was read and parsed, so a
    /// single bad file keeps the whole batch from being applied. Candidates
    /// are sorted by name.
    pub fn load_candidates(
        &self,
        snapshot_root: &Path,
        relative_path: &Path,
    ) -> Result<Vec<ClusterImageSet>> {
        let mut candidates = Vec::new();
        let mut names = BTreeSet::new();

        for raw in self.load(snapshot_root, relative_path)? {
            let raw = raw?;
            let imageset = parse_manifest(&raw).inspect_err(|_| {
                log::warn!("Failed to parse image set file {}", raw.path.display());
            })?;

            if !names.insert(imageset.name().to_string()) {
                return Err(SyncError::parse(
                    &raw.path,
                    format!("duplicate image set name '{}'", imageset.name()),
                ));
            }
            candidates.push(imageset);
        }

        candidates.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(candidates)
    }
}

/// Parses a raw manifest into a cluster image set.
pub fn parse_manifest(raw: &RawManifest) -> Result<ClusterImageSet> {
    let imageset: ClusterImageSet = serde_yaml::from_slice(&raw.bytes)
        .map_err(|e| SyncError::parse(&raw.path, e.to_string()))?;

    if imageset.kind != KIND {
        return Err(SyncError::parse(
            &raw.path,
            format!("unexpected kind '{}', expected '{}'", imageset.kind, KIND),
        ));
    }

    if imageset.name().trim().is_empty() {
        return Err(SyncError::parse(&raw.path, "metadata.name is required"));
    }

    Ok(imageset)
}

/// Joins `relative` onto `root`, rejecting absolute paths and `..`.
pub fn safe_join(root: &Path, relative: &Path) -> Result<PathBuf> {
    for component in relative.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(SyncError::PathTraversal(relative.display().to_string()));
            }
        }
    }
    Ok(root.join(relative))
}

/// Checks that `dir` still resolves inside `root` once symlinks are followed.
/// Returns the canonical root.
fn ensure_within(root: &Path, dir: &Path) -> Result<PathBuf> {
    let canonical_root = root.canonicalize().map_err(|source| SyncError::Io {
        path: root.to_path_buf(),
        source,
    })?;
    let canonical_dir = dir.canonicalize().map_err(|source| SyncError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    if canonical_dir.starts_with(&canonical_root) {
        Ok(canonical_root)
    } else {
        Err(SyncError::PathTraversal(dir.display().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manifest(name: &str, release: &str) -> String {
        format!(
            "apiVersion: hive.openshift.io/v1\nkind: ClusterImageSet\nmetadata:\n  name: {name}\n  labels:\n    channel: fast\n    visible: 'true'\nspec:\n  releaseImage: {release}\n"
        )
    }

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_load_walks_nested_directories() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "clusterImageSets/fast/4.11/a.yaml", &manifest("a", "r:a"));
        write(dir.path(), "clusterImageSets/fast/4.12/b.yaml", &manifest("b", "r:b"));
        write(dir.path(), "clusterImageSets/stable/c.yaml", &manifest("c", "r:c"));

        let candidates = ManifestLoader::new()
            .load_candidates(dir.path(), Path::new("clusterImageSets/fast"))
            .unwrap();

        let names: Vec<&str> = candidates.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_load_reads_dot_files_and_skips_git_metadata() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "sets/a.yaml", &manifest("a", "r:a"));
        write(dir.path(), "sets/.img-hidden.yaml", &manifest("hidden", "r:h"));
        write(dir.path(), "sets/.git/config", "[core]\n\tbare = false\n");

        let candidates = ManifestLoader::new()
            .load_candidates(dir.path(), Path::new("sets"))
            .unwrap();
        let names: Vec<&str> = candidates.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["a", "hidden"]);
    }

    #[test]
    fn test_unparsable_dot_file_fails_batch() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "sets/a.yaml", &manifest("a", "r:a"));
        write(dir.path(), "sets/.notes", "not: [valid");

        let result = ManifestLoader::new().load_candidates(dir.path(), Path::new("sets"));
        match result {
            Err(SyncError::Parse { path, .. }) => assert!(path.ends_with(".notes")),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_load_missing_directory_is_io_error() {
        let dir = TempDir::new().unwrap();
        let result = ManifestLoader::new().load(dir.path(), Path::new("nope"));
        assert!(matches!(result, Err(SyncError::Io { .. })));
    }

    #[test]
    fn test_load_rejects_parent_traversal() {
        let dir = TempDir::new().unwrap();
        let result = ManifestLoader::new().load(dir.path(), Path::new("../etc"));
        assert!(matches!(result, Err(SyncError::PathTraversal(_))));
    }

    #[test]
    fn test_load_rejects_absolute_path() {
        let dir = TempDir::new().unwrap();
        let result = ManifestLoader::new().load(dir.path(), Path::new("/etc"));
        assert!(matches!(result, Err(SyncError::PathTraversal(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_load_rejects_symlink_escape() {
        let outside = TempDir::new().unwrap();
        write(outside.path(), "a.yaml", &manifest("a", "r:a"));

        let dir = TempDir::new().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("sets")).unwrap();

        let result = ManifestLoader::new().load(dir.path(), Path::new("sets"));
        assert!(matches!(result, Err(SyncError::PathTraversal(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_file_link_outside_snapshot_rejected() {
        let outside = TempDir::new().unwrap();
        write(outside.path(), "secret.yaml", &manifest("stolen", "r:x"));

        let dir = TempDir::new().unwrap();
        write(dir.path(), "sets/a.yaml", &manifest("a", "r:a"));
        std::os::unix::fs::symlink(
            outside.path().join("secret.yaml"),
            dir.path().join("sets/x.yaml"),
        )
        .unwrap();

        let result = ManifestLoader::new().load_candidates(dir.path(), Path::new("sets"));
        match result {
            Err(SyncError::PathTraversal(path)) => assert!(path.ends_with("x.yaml")),
            other => panic!("expected path traversal, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_file_link_inside_snapshot_is_read() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "shared/b.yaml", &manifest("b", "r:b"));
        write(dir.path(), "sets/a.yaml", &manifest("a", "r:a"));
        std::os::unix::fs::symlink(dir.path().join("shared/b.yaml"), dir.path().join("sets/b.yaml"))
            .unwrap();

        let candidates = ManifestLoader::new()
            .load_candidates(dir.path(), Path::new("sets"))
            .unwrap();
        let names: Vec<&str> = candidates.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_one_bad_file_fails_whole_batch() {
        let dir = TempDir::new().unwrap();
        for i in 0..9 {
            write(dir.path(), &format!("sets/{i}.yaml"), &manifest(&format!("img-{i}"), "r"));
        }
        write(dir.path(), "sets/bad.yaml", "bad$:xys: [");

        let result = ManifestLoader::new().load_candidates(dir.path(), Path::new("sets"));
        match result {
            Err(SyncError::Parse { path, .. }) => assert!(path.ends_with("bad.yaml")),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "sets/a.yaml", &manifest("same", "r:1"));
        write(dir.path(), "sets/b.yaml", &manifest("same", "r:2"));

        let result = ManifestLoader::new().load_candidates(dir.path(), Path::new("sets"));
        assert!(matches!(result, Err(SyncError::Parse { .. })));
    }

    #[test]
    fn test_parse_rejects_other_kind() {
        let raw = RawManifest {
            path: PathBuf::from("cm.yaml"),
            bytes: b"apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: x\n".to_vec(),
        };
        let err = parse_manifest(&raw).unwrap_err();
        assert!(err.to_string().contains("ConfigMap"));
    }

    #[test]
    fn test_parse_requires_name() {
        let raw = RawManifest {
            path: PathBuf::from("noname.yaml"),
            bytes: b"kind: ClusterImageSet\nmetadata:\n  name: ''\nspec:\n  releaseImage: r\n".to_vec(),
        };
        assert!(matches!(parse_manifest(&raw), Err(SyncError::Parse { .. })));
    }

    #[test]
    fn test_safe_join_allows_curdir() {
        let joined = safe_join(Path::new("/snap"), Path::new("./a/b")).unwrap();
        assert_eq!(joined, PathBuf::from("/snap/./a/b"));
    }
}
