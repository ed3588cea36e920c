//! Orchestration run state
//!
//! An [`OrchestrationRun`] is the only mutable run-wide state. It is owned by
//! the control thread and passed by `&mut` to whichever driver is active, so
//! the counters need no synchronization.

use std::fmt;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::unit::{DeploymentUnit, UnitState};
use crate::error::{ChainrollError, Result, unit};
use crate::report::log::RunLog;

/// Which driver the run uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Deploy,
    Test,
}

impl RunMode {
    /// File name prefix of the run log
    pub fn log_prefix(self) -> &'static str {
        match self {
            RunMode::Deploy => "deployment",
            RunMode::Test => "test-results",
        }
    }

    /// Whether `state` is the success state of this mode
    pub fn is_success(self, state: UnitState) -> bool {
        match self {
            RunMode::Deploy => matches!(state, UnitState::Deployed | UnitState::Skipped),
            RunMode::Test => matches!(state, UnitState::Tested | UnitState::Skipped),
        }
    }

    /// Whether `state` ends a unit's cycle in this mode
    fn is_terminal(self, state: UnitState) -> bool {
        match self {
            RunMode::Deploy => matches!(
                state,
                UnitState::Deployed | UnitState::Failed | UnitState::Skipped
            ),
            RunMode::Test => matches!(
                state,
                UnitState::Tested | UnitState::TestFailed | UnitState::Failed | UnitState::Skipped
            ),
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Deploy => f.write_str("deploy"),
            RunMode::Test => f.write_str("test"),
        }
    }
}

/// Outcome of one request/assert pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssertionResult {
    pub test: String,
    pub condition: String,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl AssertionResult {
    pub fn pass(test: impl Into<String>, condition: impl Into<String>) -> Self {
        Self {
            test: test.into(),
            condition: condition.into(),
            passed: true,
            detail: None,
        }
    }

    pub fn fail(
        test: impl Into<String>,
        condition: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            test: test.into(),
            condition: condition.into(),
            passed: false,
            detail: Some(detail.into()),
        }
    }
}

/// Aggregate counters of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounters {
    pub deployed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub tested: usize,
    pub test_failed: usize,
}

/// Everything recorded about one unit during the run
#[derive(Debug, Clone)]
pub struct UnitRecord {
    pub unit: DeploymentUnit,
    pub error: Option<String>,
    pub remediation: Option<String>,
    pub assertions: Vec<AssertionResult>,
    pub warnings: Vec<String>,
    pub elapsed_ms: Option<u64>,
    started: Option<Instant>,
}

impl UnitRecord {
    fn new(unit: DeploymentUnit) -> Self {
        Self {
            unit,
            error: None,
            remediation: None,
            assertions: Vec::new(),
            warnings: Vec::new(),
            elapsed_ms: None,
            started: None,
        }
    }

    pub fn state(&self) -> UnitState {
        self.unit.state()
    }

    pub fn assertions_passed(&self) -> usize {
        self.assertions.iter().filter(|a| a.passed).count()
    }
}

/// Why the run stopped early
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FatalAbort {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
    pub exit_code: i32,
}

impl From<&ChainrollError> for FatalAbort {
    fn from(err: &ChainrollError) -> Self {
        use miette::Diagnostic;

        Self {
            code: err
                .code()
                .map_or_else(|| "chainroll::fatal".to_string(), |c| c.to_string()),
            message: err.to_string(),
            remediation: err.remediation(),
            exit_code: err.exit_code(),
        }
    }
}

/// Top-level session of one `deploy` or `test` invocation
#[derive(Debug)]
pub struct OrchestrationRun {
    mode: RunMode,
    started_at: DateTime<Utc>,
    records: Vec<UnitRecord>,
    counters: RunCounters,
    fatal: Option<FatalAbort>,
    log: RunLog,
}

impl OrchestrationRun {
    pub fn new(mode: RunMode, units: Vec<DeploymentUnit>, mut log: RunLog) -> Self {
        let labels: Vec<String> = units.iter().map(DeploymentUnit::label).collect();
        log.event("run_started", json!({ "mode": mode, "units": labels }));
        Self {
            mode,
            started_at: Utc::now(),
            records: units.into_iter().map(UnitRecord::new).collect(),
            counters: RunCounters::default(),
            fatal: None,
            log,
        }
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn total(&self) -> usize {
        self.records.len()
    }

    pub fn records(&self) -> &[UnitRecord] {
        &self.records
    }

    pub fn record(&self, idx: usize) -> &UnitRecord {
        &self.records[idx]
    }

    pub fn unit(&self, idx: usize) -> &DeploymentUnit {
        &self.records[idx].unit
    }

    pub fn counters(&self) -> RunCounters {
        self.counters
    }

    pub fn fatal(&self) -> Option<&FatalAbort> {
        self.fatal.as_ref()
    }

    pub fn log_mut(&mut self) -> &mut RunLog {
        &mut self.log
    }

    pub fn log(&self) -> &RunLog {
        &self.log
    }

    /// Units that left `PENDING`
    pub fn attempted(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.state() != UnitState::Pending)
            .count()
    }

    /// Names of units whose cycle is over; their ephemeral leftovers may be reclaimed
    pub fn finished_units(&self) -> Vec<String> {
        self.records
            .iter()
            .filter(|r| r.state().is_finished())
            .map(|r| r.unit.name.clone())
            .collect()
    }

    /// `deployed + failed + skipped == total`
    pub fn is_balanced(&self) -> bool {
        self.counters.deployed + self.counters.failed + self.counters.skipped == self.total()
    }

    pub fn assertions_total(&self) -> usize {
        self.records.iter().map(|r| r.assertions.len()).sum()
    }

    pub fn assertions_passed(&self) -> usize {
        self.records.iter().map(UnitRecord::assertions_passed).sum()
    }

    /// Move unit `idx` to `next`, enforcing single-flight execution
    pub fn transition(&mut self, idx: usize, next: UnitState) -> Result<()> {
        if next.is_in_flight() {
            if let Some(other) = self
                .records
                .iter()
                .enumerate()
                .find(|(i, r)| *i != idx && r.state().is_in_flight())
            {
                return Err(unit::invalid_transition(
                    &self.records[idx].unit.name,
                    self.records[idx].state(),
                    format!("{next} while '{}' is {}", other.1.unit.name, other.1.state()),
                ));
            }
        }

        let mode = self.mode;
        let record = &mut self.records[idx];
        let from = record.state();
        record.unit.transition(next)?;

        if from == UnitState::Pending {
            record.started = Some(Instant::now());
        }
        if mode.is_terminal(next) {
            record.elapsed_ms = record
                .started
                .map(|s| u64::try_from(s.elapsed().as_millis()).unwrap_or(u64::MAX));
        }

        match next {
            UnitState::Deployed => self.counters.deployed += 1,
            UnitState::Failed => self.counters.failed += 1,
            UnitState::Skipped => self.counters.skipped += 1,
            UnitState::Tested => self.counters.tested += 1,
            UnitState::TestFailed => self.counters.test_failed += 1,
            UnitState::Pending | UnitState::Deploying | UnitState::Testing => {}
        }

        let name = record.unit.name.clone();
        self.log.event(
            "unit_state",
            json!({ "unit": name, "from": from, "to": next }),
        );
        Ok(())
    }

    /// Record the error that decided unit `idx`'s outcome
    pub fn record_error(&mut self, idx: usize, err: &ChainrollError) {
        let record = &mut self.records[idx];
        record.error = Some(err.to_string());
        record.remediation = err.remediation();
        let name = record.unit.name.clone();
        self.log.event(
            "unit_error",
            json!({ "unit": name, "error": err.to_string(), "remediation": err.remediation() }),
        );
    }

    /// Record a non-blocking warning (teardown, late resource pressure) against unit `idx`
    pub fn record_warning(&mut self, idx: usize, err: &ChainrollError) {
        let record = &mut self.records[idx];
        record.warnings.push(err.to_string());
        let name = record.unit.name.clone();
        self.log.event(
            "unit_warning",
            json!({ "unit": name, "warning": err.to_string() }),
        );
    }

    /// Record the assertion outcomes of unit `idx`'s battery
    pub fn record_assertions(&mut self, idx: usize, results: Vec<AssertionResult>) {
        let name = self.records[idx].unit.name.clone();
        for result in &results {
            self.log.event("assertion", json!({ "unit": name, "result": result }));
        }
        self.records[idx].assertions.extend(results);
    }

    /// Mark the run as aborted by a fatal precondition
    pub fn abort(&mut self, err: &ChainrollError) {
        let fatal = FatalAbort::from(err);
        self.log.event("run_aborted", json!({ "fatal": fatal }));
        self.fatal = Some(fatal);
    }
}
