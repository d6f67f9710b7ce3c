use serde::Serialize;

use super::apply::{ApplyAction, ApplyOutcome};
use super::cleanup::CleanupReport;
use super::policy::CyclePhase;

/// Summary of one sync cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub phase: CyclePhase,
    /// The branch head had not moved; nothing was fetched or written.
    pub skipped: bool,
    /// Revision the cycle saw (the synced one, or the unchanged head).
    pub revision: Option<String>,
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub unchanged: Vec<String>,
    /// `None` when the cycle was not eligible for cleanup.
    pub cleanup: Option<CleanupReport>,
}

impl CycleReport {
    pub(crate) fn new(phase: CyclePhase) -> Self {
        Self {
            phase,
            skipped: false,
            revision: None,
            created: Vec::new(),
            updated: Vec::new(),
            unchanged: Vec::new(),
            cleanup: None,
        }
    }

    pub(crate) fn skipped(phase: CyclePhase, revision: String) -> Self {
        Self {
            skipped: true,
            revision: Some(revision),
            ..Self::new(phase)
        }
    }

    pub(crate) fn record(&mut self, outcome: ApplyOutcome) {
        let bucket = match outcome.action {
            ApplyAction::Created => &mut self.created,
            ApplyAction::Updated => &mut self.updated,
            ApplyAction::Unchanged => &mut self.unchanged,
        };
        bucket.push(outcome.name);
    }

    /// Names deleted by the cleanup pass, if one ran.
    pub fn deleted(&self) -> &[String] {
        self.cleanup
            .as_ref()
            .map(|c| c.deleted.as_slice())
            .unwrap_or_default()
    }

    /// Number of store writes the cycle caused.
    pub fn writes(&self) -> usize {
        self.created.len() + self.updated.len() + self.deleted().len()
    }
}
