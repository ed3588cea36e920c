//! Domain models for chainroll
//!
//! Units, their state machine, the run that owns them, and resource
//! snapshots. Nothing in here talks to the outside world except the run log.

pub mod run;
pub mod snapshot;
pub mod unit;

pub use run::{AssertionResult, FatalAbort, OrchestrationRun, RunCounters, RunMode, UnitRecord};
pub use snapshot::ResourceSnapshot;
pub use unit::{DeploymentUnit, Expectation, HttpMethod, TestCase, UnitState};
