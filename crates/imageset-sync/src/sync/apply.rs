//! Per-record apply decision: create, update or leave alone.

use serde::Serialize;

use crate::error::Result;
use crate::imageset::ClusterImageSet;
use crate::store::ImageSetStore;

/// What the engine did with a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ApplyAction {
    Created,
    Updated,
    Unchanged,
}

/// Result of applying one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyOutcome {
    /// Name of the persisted record.
    pub name: String,
    pub action: ApplyAction,
}

/// Applies candidates to a store, one at a time.
pub struct ApplyEngine<'a, S: ImageSetStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: ImageSetStore + ?Sized> ApplyEngine<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Makes the persisted record match `candidate`.
    ///
    /// Only the release image and tracked labels decide whether an update
    /// is needed. When one is, the payload and the full label map are
    /// copied onto the existing record. Store errors are returned
    /// immediately.
    pub fn apply(&self, candidate: &ClusterImageSet) -> Result<ApplyOutcome> {
        let name = candidate.name();

        let Some(mut existing) = self.store.get(name)? else {
            let created = self.store.create(candidate)?;
            log::info!("Created cluster image set {}", created.name());
            return Ok(ApplyOutcome {
                name: created.metadata.name,
                action: ApplyAction::Created,
            });
        };

        if existing.field_equal(candidate) {
            log::debug!("Cluster image set {} unchanged", name);
            return Ok(ApplyOutcome {
                name: existing.metadata.name,
                action: ApplyAction::Unchanged,
            });
        }

        existing.merge_desired(candidate);
        let updated = self.store.update(name, &existing)?;
        log::info!(
            "Updated cluster image set {} to {}",
            updated.name(),
            updated.release_image()
        );
        Ok(ApplyOutcome {
            name: updated.metadata.name,
            action: ApplyAction::Updated,
        })
    }
}
