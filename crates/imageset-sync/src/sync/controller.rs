//! One sync cycle, end to end.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::Instrument;

use super::apply::ApplyEngine;
use super::cleanup::GarbageCollector;
use super::gate::{GateDecision, RevisionGate};
use super::policy::CyclePhase;
use super::report::CycleReport;
use crate::config::SettingsProvider;
use crate::error::{Result, SyncError};
use crate::imageset::ManifestLoader;
use crate::sanitize::redact_repo_url;
use crate::source::{SourceProvider, SourceTarget};
use crate::store::ImageSetStore;

/// Runs sync cycles and remembers the last synced revision together with
/// the target it was read from.
///
/// The revision lives in memory only, so a restarted process always does a
/// full first sync. A settings change that moves the target (url, branch,
/// path or channel) also forces a full sync, even when the head is
/// unchanged.
pub struct ImageSetController {
    settings: Arc<dyn SettingsProvider>,
    source: Arc<dyn SourceProvider>,
    store: Arc<dyn ImageSetStore>,
    loader: ManifestLoader,
    last_synced: Option<(SourceTarget, String)>,
}

impl ImageSetController {
    pub fn new(
        settings: Arc<dyn SettingsProvider>,
        source: Arc<dyn SourceProvider>,
        store: Arc<dyn ImageSetStore>,
    ) -> Self {
        Self {
            settings,
            source,
            store,
            loader: ManifestLoader::new(),
            last_synced: None,
        }
    }

    /// Revision of the last fully successful cycle.
    pub fn last_revision(&self) -> Option<&str> {
        self.last_synced.as_ref().map(|(_, revision)| revision.as_str())
    }

    /// Last synced revision, if it was read from `target`.
    fn revision_for(&self, target: &SourceTarget) -> Option<&str> {
        match &self.last_synced {
            Some((synced, revision)) if synced == target => Some(revision.as_str()),
            Some((synced, _)) => {
                log::info!(
                    "Sync target changed from {}/{} to {}/{}, running a full sync",
                    synced.path,
                    synced.channel,
                    target.path,
                    target.channel
                );
                None
            }
            None => None,
        }
    }

    /// Runs one cycle.
    ///
    /// The last revision is only advanced when every step succeeded; on any
    /// error the next cycle starts over from a fresh snapshot.
    pub async fn run_cycle(&mut self, phase: CyclePhase) -> Result<CycleReport> {
        let settings = self.settings.load()?;
        let span = tracing::info_span!(
            "sync_cycle",
            repo = %redact_repo_url(&settings.git_repo_url),
            branch = %settings.git_repo_branch,
            channel = %settings.channel,
            phase = ?phase,
        );

        async move {
            let repo = settings.repository_source()?;
            let target = repo.target();

            let gate = RevisionGate::new(self.source.as_ref());
            if let GateDecision::Skip { revision } = gate
                .should_sync(&repo, self.revision_for(&target))
                .await?
            {
                return Ok(CycleReport::skipped(phase, revision));
            }

            let workdir = tempfile::Builder::new()
                .prefix("imageset-sync-")
                .tempdir()
                .map_err(|source| SyncError::Io {
                    path: std::env::temp_dir(),
                    source,
                })?;
            let snapshot = self
                .source
                .snapshot(&repo, &workdir.path().join("repo"))
                .await?;

            let candidates = self
                .loader
                .load_candidates(&snapshot.root, &repo.manifest_dir())?;
            log::info!(
                "Loaded {} cluster image set(s) at {}",
                candidates.len(),
                snapshot.revision
            );

            let mut report = CycleReport::new(phase);
            let mut names = BTreeSet::new();
            {
                let _step = tracing::info_span!("apply").entered();
                let engine = ApplyEngine::new(self.store.as_ref());
                for candidate in &candidates {
                    let outcome = engine.apply(candidate)?;
                    names.insert(outcome.name.clone());
                    report.record(outcome);
                }
            }

            if settings.cleanup.should_cleanup(phase) {
                let _step = tracing::info_span!("cleanup").entered();
                report.cleanup = Some(GarbageCollector::new(self.store.as_ref()).reconcile(&names)?);
            }

            log::info!(
                "Synced revision {}: {} created, {} updated, {} unchanged, {} deleted",
                snapshot.revision,
                report.created.len(),
                report.updated.len(),
                report.unchanged.len(),
                report.deleted().len()
            );
            report.revision = Some(snapshot.revision.clone());
            self.last_synced = Some((target, snapshot.revision));
            Ok(report)
        }
        .instrument(span)
        .await
    }
}
