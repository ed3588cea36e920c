//! Run summary and reporting
//!
//! This module handles:
//! - The append-only JSON-lines run log ([`log`])
//! - Aggregating a finished run into a [`RunReport`] and its exit code
//! - Rendering the human-readable summary ([`render`])

pub mod log;
pub mod render;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;

use crate::domain::{AssertionResult, FatalAbort, OrchestrationRun, RunCounters, RunMode, UnitState};
use crate::error::EXIT_UNIT_FAILURES;

pub use render::render;

/// Per-unit part of the report
#[derive(Debug, Clone, Serialize)]
pub struct UnitReport {
    pub name: String,
    pub version: String,
    pub sequence: u32,
    pub state: UnitState,
    pub attempted: bool,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub assertions: Vec<AssertionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
}

impl UnitReport {
    pub fn assertions_passed(&self) -> usize {
        self.assertions.iter().filter(|a| a.passed).count()
    }
}

/// Structured outcome of a whole run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub mode: RunMode,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total: usize,
    pub attempted: usize,
    pub counters: RunCounters,
    pub assertions_passed: usize,
    pub assertions_total: usize,
    pub units: Vec<UnitReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fatal: Option<FatalAbort>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_path: Option<String>,
    pub exit_code: i32,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }

    /// Units that were attempted and did not reach the mode's success state
    pub fn failed_units(&self) -> impl Iterator<Item = &UnitReport> {
        self.units.iter().filter(|u| u.attempted && !u.success)
    }
}

/// Aggregate `run` into a report and write the `summary` event
///
/// Exit code: the fatal abort's code if there was one, `1` when any attempted
/// unit missed its success state, `0` otherwise.
pub fn summarize(run: &mut OrchestrationRun) -> RunReport {
    let mode = run.mode();
    let units: Vec<UnitReport> = run
        .records()
        .iter()
        .map(|record| {
            let state = record.state();
            UnitReport {
                name: record.unit.name.clone(),
                version: record.unit.version.clone(),
                sequence: record.unit.sequence,
                state,
                attempted: state != UnitState::Pending,
                success: mode.is_success(state),
                error: record.error.clone(),
                remediation: record.remediation.clone(),
                warnings: record.warnings.clone(),
                assertions: record.assertions.clone(),
                elapsed_ms: record.elapsed_ms,
            }
        })
        .collect();

    let fatal = run.fatal().cloned();
    let exit_code = match fatal {
        Some(ref fatal) => fatal.exit_code,
        None if units.iter().any(|u| u.attempted && !u.success) => EXIT_UNIT_FAILURES,
        None => 0,
    };

    let report = RunReport {
        mode,
        started_at: run.started_at(),
        finished_at: Utc::now(),
        total: run.total(),
        attempted: run.attempted(),
        counters: run.counters(),
        assertions_passed: run.assertions_passed(),
        assertions_total: run.assertions_total(),
        units,
        fatal,
        log_path: run.log().path().map(|p| p.display().to_string()),
        exit_code,
    };

    run.log_mut().event(
        "summary",
        json!({
            "counters": report.counters,
            "attempted": report.attempted,
            "total": report.total,
            "assertions": { "passed": report.assertions_passed, "total": report.assertions_total },
            "exit_code": report.exit_code,
        }),
    );
    tracing::info!(
        mode = %mode,
        deployed = report.counters.deployed,
        failed = report.counters.failed,
        skipped = report.counters.skipped,
        exit_code,
        "run finished"
    );
    report
}
