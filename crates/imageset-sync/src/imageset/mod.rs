//! Cluster image set resources and the manifest loader.

pub mod loader;
pub mod resource;

pub use loader::{parse_manifest, safe_join, ManifestLoader, Manifests, RawManifest};
pub use resource::{
    ClusterImageSet, ClusterImageSetSpec, ObjectMeta, API_VERSION, CHANNEL_LABEL, KIND,
    TRACKED_LABELS, VISIBLE_LABEL,
};
