//! Garbage collection of records that disappeared upstream.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::error::Result;
use crate::store::ImageSetStore;

/// What a cleanup pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub deleted: Vec<String>,
    /// Records skipped because they carry no channel label.
    pub protected: usize,
}

/// Deletes sync-managed records that are no longer candidates.
pub struct GarbageCollector<'a, S: ImageSetStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: ImageSetStore + ?Sized> GarbageCollector<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Removes every record that has a non-empty channel label and whose
    /// name is not in `candidates`.
    ///
    /// The first failed delete ends the pass and is returned.
    pub fn reconcile(&self, candidates: &BTreeSet<String>) -> Result<CleanupReport> {
        let mut report = CleanupReport::default();

        for record in self.store.list()? {
            if !record.is_sync_managed() {
                report.protected += 1;
                continue;
            }
            if candidates.contains(record.name()) {
                continue;
            }

            log::info!(
                "Deleting cluster image set {} (channel {})",
                record.name(),
                record.channel().unwrap_or_default()
            );
            if let Err(e) = self.store.delete(record.name()) {
                log::error!("Failed to delete cluster image set {}: {}", record.name(), e);
                return Err(e.into());
            }
            report.deleted.push(record.metadata.name);
        }

        Ok(report)
    }
}
