//! K8s-style `ClusterImageSet` resource.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The API version for cluster image sets.
pub const API_VERSION: &str = "hive.openshift.io/v1";

/// The only resource kind this crate manages.
pub const KIND: &str = "ClusterImageSet";

/// Label marking a record as owned by the sync. Records without it (or with
/// an empty value) belong to someone else and are never garbage collected.
pub const CHANNEL_LABEL: &str = "channel";

/// Label controlling whether the image set is offered to users.
pub const VISIBLE_LABEL: &str = "visible";

/// Labels compared when deciding whether a persisted record needs an update.
pub const TRACKED_LABELS: &[&str] = &[VISIBLE_LABEL];

/// Metadata for a resource, following K8s conventions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// The unique name of the resource.
    pub name: String,

    /// Key-value labels for organizing and selecting resources.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    /// Key-value annotations for storing additional metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    /// Store-assigned identifier, stable for the lifetime of the record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,

    /// Store-assigned version, bumped on every update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<u64>,

    /// When the store first persisted the record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,
}

impl ObjectMeta {
    /// Creates a new ObjectMeta with just a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Adds a label to the metadata.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Returns a label value, treating a missing label as empty.
    pub fn label(&self, key: &str) -> &str {
        self.labels.get(key).map(String::as_str).unwrap_or("")
    }
}

/// Desired state of a cluster image set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterImageSetSpec {
    /// Release image pull spec, e.g. `quay.io/openshift-release-dev/ocp-release:4.11.0-x86_64`.
    #[serde(default)]
    pub release_image: String,
}

/// A cluster image set record, as declared in a manifest or as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterImageSet {
    #[serde(default = "default_api_version")]
    pub api_version: String,

    #[serde(default = "default_kind")]
    pub kind: String,

    pub metadata: ObjectMeta,

    #[serde(default)]
    pub spec: ClusterImageSetSpec,
}

fn default_api_version() -> String {
    API_VERSION.to_string()
}

fn default_kind() -> String {
    KIND.to_string()
}

impl ClusterImageSet {
    /// Creates a new image set with the given name and release image.
    pub fn new(name: impl Into<String>, release_image: impl Into<String>) -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ObjectMeta::new(name),
            spec: ClusterImageSetSpec {
                release_image: release_image.into(),
            },
        }
    }

    /// Adds a label.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.labels.insert(key.into(), value.into());
        self
    }

    /// Returns the name of the resource.
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Returns the release image.
    pub fn release_image(&self) -> &str {
        &self.spec.release_image
    }

    /// Returns the channel label value, if set and non-empty.
    pub fn channel(&self) -> Option<&str> {
        Some(self.metadata.label(CHANNEL_LABEL)).filter(|c| !c.is_empty())
    }

    /// A record is sync-managed when it carries a non-empty channel label.
    pub fn is_sync_managed(&self) -> bool {
        self.channel().is_some()
    }

    /// Compares the payload and the tracked labels only.
    ///
    /// Labels outside [`TRACKED_LABELS`] are ignored so that churn from
    /// other writers does not cause updates.
    pub fn field_equal(&self, other: &ClusterImageSet) -> bool {
        self.spec.release_image == other.spec.release_image
            && TRACKED_LABELS
                .iter()
                .all(|key| self.metadata.label(key) == other.metadata.label(key))
    }

    /// Copies the payload and the full label map from `desired`, keeping
    /// everything else (uid, annotations, versions) from `self`.
    pub fn merge_desired(&mut self, desired: &ClusterImageSet) {
        self.spec = desired.spec.clone();
        self.metadata.labels = desired.metadata.labels.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn img(release: &str, visible: &str) -> ClusterImageSet {
        ClusterImageSet::new("img4.11.0-x86-64", release).with_label(VISIBLE_LABEL, visible)
    }

    #[test]
    fn test_field_equal_identical() {
        assert!(img("r:1", "true").field_equal(&img("r:1", "true")));
    }

    #[test]
    fn test_field_equal_release_changed() {
        let a = img("r:1", "true");
        let b = img("r:2", "true");
        assert!(!a.field_equal(&b));
        assert!(!b.field_equal(&a));
    }

    #[test]
    fn test_field_equal_visible_changed() {
        assert!(!img("r:1", "true").field_equal(&img("r:1", "false")));
    }

    #[test]
    fn test_field_equal_ignores_untracked_labels() {
        let a = img("r:1", "true").with_label("team", "a");
        let b = img("r:1", "true").with_label("team", "b").with_label(CHANNEL_LABEL, "fast");
        assert!(a.field_equal(&b));
        assert!(b.field_equal(&a));
    }

    #[test]
    fn test_missing_visible_equals_empty_visible() {
        let a = ClusterImageSet::new("x", "r:1");
        let b = ClusterImageSet::new("x", "r:1").with_label(VISIBLE_LABEL, "");
        assert!(a.field_equal(&b));
    }

    #[test]
    fn test_sync_managed() {
        assert!(!ClusterImageSet::new("x", "r").is_sync_managed());
        assert!(!ClusterImageSet::new("x", "r")
            .with_label(CHANNEL_LABEL, "")
            .is_sync_managed());
        let managed = ClusterImageSet::new("x", "r").with_label(CHANNEL_LABEL, "fast");
        assert!(managed.is_sync_managed());
        assert_eq!(managed.channel(), Some("fast"));
    }

    #[test]
    fn test_merge_desired_keeps_identity() {
        let mut existing = img("r:1", "true").with_label("extra", "kept-until-merge");
        existing.metadata.uid = Some("uid-1".to_string());
        existing.metadata.resource_version = Some(3);
        existing
            .metadata
            .annotations
            .insert("note".to_string(), "keep".to_string());

        let desired = img("r:2", "false");
        existing.merge_desired(&desired);

        assert_eq!(existing.release_image(), "r:2");
        assert_eq!(existing.metadata.labels, desired.metadata.labels);
        assert_eq!(existing.metadata.uid.as_deref(), Some("uid-1"));
        assert_eq!(existing.metadata.resource_version, Some(3));
        assert_eq!(existing.metadata.annotations.get("note").unwrap(), "keep");
    }

    #[test]
    fn test_deserialize_manifest() {
        let yaml = r#"
apiVersion: hive.openshift.io/v1
kind: ClusterImageSet
metadata:
  name: img4.11.0-x86-64-appsub
  labels:
    channel: fast
    visible: 'true'
spec:
  releaseImage: quay.io/openshift-release-dev/ocp-release:4.11.0-x86_64
"#;
        let set: ClusterImageSet = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(set.name(), "img4.11.0-x86-64-appsub");
        assert_eq!(set.channel(), Some("fast"));
        assert_eq!(set.metadata.label(VISIBLE_LABEL), "true");
        assert_eq!(
            set.release_image(),
            "quay.io/openshift-release-dev/ocp-release:4.11.0-x86_64"
        );
    }
}
