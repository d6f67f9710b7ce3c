//! Revision gate: skips the expensive part of a cycle when the branch head
//! has not moved.

use crate::error::Result;
use crate::source::{RepositorySource, SourceProvider};

/// Whether a cycle should go on to take a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Never synced, or the head moved.
    Proceed,
    /// The head still points at the last synced revision.
    Skip { revision: String },
}

/// Compares the remote branch head against the last synced revision.
pub struct RevisionGate<'a, P: SourceProvider + ?Sized> {
    provider: &'a P,
}

impl<'a, P: SourceProvider + ?Sized> RevisionGate<'a, P> {
    pub fn new(provider: &'a P) -> Self {
        Self { provider }
    }

    /// Decides whether to sync.
    ///
    /// With no previous revision the remote is not consulted at all. A
    /// lookup failure is returned as is; the caller keeps its revision so
    /// the next cycle retries.
    pub async fn should_sync(
        &self,
        source: &RepositorySource,
        last_revision: Option<&str>,
    ) -> Result<GateDecision> {
        let Some(last) = last_revision.filter(|r| !r.is_empty()) else {
            log::debug!("No previous revision, syncing");
            return Ok(GateDecision::Proceed);
        };

        let current = self.provider.revision_of(source).await?;
        if current == last {
            log::debug!("Branch {} unchanged at {}", source.branch, current);
            Ok(GateDecision::Skip { revision: current })
        } else {
            log::info!(
                "Branch {} moved from {} to {}",
                source.branch,
                last,
                current
            );
            Ok(GateDecision::Proceed)
        }
    }
}
