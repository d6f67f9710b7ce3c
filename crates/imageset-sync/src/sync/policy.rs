//! Cycle phase and cleanup cadence.

use serde::{Deserialize, Serialize};

/// Where the scheduler is in its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CyclePhase {
    /// No cycle has completed successfully yet.
    AwaitingFirstSync,
    /// At least one cycle has completed successfully.
    SteadyState,
}

impl CyclePhase {
    /// Phase to use for the next cycle, given how this one ended.
    pub fn after(self, succeeded: bool) -> Self {
        if succeeded {
            CyclePhase::SteadyState
        } else {
            self
        }
    }
}

/// When the garbage collector is allowed to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CleanupPolicy {
    /// Only until the first cycle succeeds.
    #[default]
    FirstSyncOnly,
    /// On every cycle that passes the revision gate.
    EveryCycle,
    /// Never delete anything.
    Never,
}

impl CleanupPolicy {
    /// Returns true if a cycle in `phase` should garbage collect.
    pub fn should_cleanup(self, phase: CyclePhase) -> bool {
        match self {
            CleanupPolicy::FirstSyncOnly => phase == CyclePhase::AwaitingFirstSync,
            CleanupPolicy::EveryCycle => true,
            CleanupPolicy::Never => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_cleanup_table() {
        use CleanupPolicy::*;
        use CyclePhase::*;

        let cases = [
            (FirstSyncOnly, AwaitingFirstSync, true),
            (FirstSyncOnly, SteadyState, false),
            (EveryCycle, AwaitingFirstSync, true),
            (EveryCycle, SteadyState, true),
            (Never, AwaitingFirstSync, false),
            (Never, SteadyState, false),
        ];
        for (policy, phase, expected) in cases {
            assert_eq!(
                policy.should_cleanup(phase),
                expected,
                "{:?} in {:?}",
                policy,
                phase
            );
        }
    }

    #[test]
    fn test_phase_advances_only_on_success() {
        assert_eq!(
            CyclePhase::AwaitingFirstSync.after(false),
            CyclePhase::AwaitingFirstSync
        );
        assert_eq!(
            CyclePhase::AwaitingFirstSync.after(true),
            CyclePhase::SteadyState
        );
        assert_eq!(CyclePhase::SteadyState.after(false), CyclePhase::SteadyState);
    }

    #[test]
    fn test_policy_serde_names() {
        let p: CleanupPolicy = serde_yaml::from_str("every-cycle").unwrap();
        assert_eq!(p, CleanupPolicy::EveryCycle);
        let p: CleanupPolicy = serde_yaml::from_str("first-sync-only").unwrap();
        assert_eq!(p, CleanupPolicy::FirstSyncOnly);
    }
}
