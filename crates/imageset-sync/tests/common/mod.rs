//! Shared test utilities for imageset-sync integration tests.
//!
//! - `FakeUpstream`: an in-process `SourceProvider` whose branch content and
//!   head revision the test controls
//! - builders for manifests and controllers

pub mod builders;
pub mod upstream;

pub use builders::*;
pub use upstream::FakeUpstream;
