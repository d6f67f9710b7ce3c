//! The sync engine: revision gate, apply engine, garbage collector, the
//! controller that ties them into one cycle, and the scheduler that runs
//! cycles on an interval.

pub mod apply;
pub mod cleanup;
pub mod controller;
pub mod gate;
pub mod policy;
pub mod report;
pub mod scheduler;

pub use apply::{ApplyAction, ApplyEngine, ApplyOutcome};
pub use cleanup::{CleanupReport, GarbageCollector};
pub use controller::ImageSetController;
pub use gate::{GateDecision, RevisionGate};
pub use policy::{CleanupPolicy, CyclePhase};
pub use report::CycleReport;
pub use scheduler::{CycleEvent, SyncScheduler};
