//! Builders for manifests and controllers.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use imageset_sync::config::SyncSettings;
use imageset_sync::store::ImageSetStore;
use imageset_sync::sync::{CleanupPolicy, ImageSetController};

use super::FakeUpstream;

/// Builds the YAML text of a `ClusterImageSet` manifest.
pub struct ManifestBuilder {
    name: String,
    release_image: String,
    labels: BTreeMap<String, String>,
}

impl ManifestBuilder {
    /// A manifest in the `fast` channel.
    pub fn new(name: &str, release_image: &str) -> Self {
        Self {
            name: name.to_string(),
            release_image: release_image.to_string(),
            labels: BTreeMap::from([("channel".to_string(), "fast".to_string())]),
        }
    }

    pub fn label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_string(), value.to_string());
        self
    }

    pub fn visible(self, visible: bool) -> Self {
        self.label("visible", if visible { "true" } else { "false" })
    }

    pub fn build(&self) -> String {
        let mut yaml = format!(
            "apiVersion: hive.openshift.io/v1\nkind: ClusterImageSet\nmetadata:\n  name: {}\n",
            self.name
        );
        if !self.labels.is_empty() {
            yaml.push_str("  labels:\n");
            for (key, value) in &self.labels {
                yaml.push_str(&format!("    {}: '{}'\n", key, value));
            }
        }
        yaml.push_str(&format!("spec:\n  releaseImage: {}\n", self.release_image));
        yaml
    }
}

/// Settings pointing at the fake upstream's `clusterImageSets/fast`.
pub fn settings(cleanup: CleanupPolicy) -> SyncSettings {
    SyncSettings {
        git_repo_url: "https://git.example.com/releases.git".to_string(),
        cleanup,
        ..SyncSettings::default()
    }
}

pub fn controller(
    upstream: &Arc<FakeUpstream>,
    store: Arc<dyn ImageSetStore>,
    cleanup: CleanupPolicy,
) -> ImageSetController {
    ImageSetController::new(Arc::new(settings(cleanup)), upstream.clone(), store)
}
