//! Single-flight deployment scheduler
//!
//! Units are driven one at a time, in registry order, through
//! lookup → resource pre-check → deploy → verify → stabilize, followed by a
//! resource post-check. A unit failure is recorded and the run moves on; only
//! fatal preconditions stop it.

pub mod decision;

use std::time::Duration;

use serde_json::json;

use crate::config::TimingConfig;
use crate::domain::{DeploymentUnit, OrchestrationRun, UnitState};
use crate::error::{ChainrollError, Result, unit};
use crate::ledger::LedgerNetwork;
use crate::pause::{Pause, PauseKind};
use crate::resource::{GuardCheck, ResourceGuard};
use crate::ui::ProgressReporter;

pub use decision::{PromptDecision, ReplaceChoice, ReplaceDecision, ReplaceExisting, SkipExisting};

/// Bounded waits of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunPolicy {
    pub deploy_timeout: Duration,
    pub stabilization: Duration,
    pub recovery: Duration,
}

impl RunPolicy {
    pub fn from_timing(timing: &TimingConfig) -> Self {
        Self {
            deploy_timeout: timing.deploy_timeout(),
            stabilization: timing.stabilization(),
            recovery: timing.recovery(),
        }
    }
}

/// Drives units through deployment one at a time
pub struct DeploymentScheduler<'a> {
    ledger: &'a mut dyn LedgerNetwork,
    guard: &'a mut ResourceGuard,
    decision: &'a mut dyn ReplaceDecision,
    pause: &'a mut dyn Pause,
    progress: &'a mut dyn ProgressReporter,
    policy: RunPolicy,
}

impl<'a> DeploymentScheduler<'a> {
    pub fn new(
        ledger: &'a mut dyn LedgerNetwork,
        guard: &'a mut ResourceGuard,
        decision: &'a mut dyn ReplaceDecision,
        pause: &'a mut dyn Pause,
        progress: &'a mut dyn ProgressReporter,
        policy: RunPolicy,
    ) -> Self {
        Self {
            ledger,
            guard,
            decision,
            pause,
            progress,
            policy,
        }
    }

    pub fn policy(&self) -> RunPolicy {
        self.policy
    }

    /// Deployment-only run over every unit
    pub fn run(&mut self, run: &mut OrchestrationRun) -> Result<()> {
        let result = self.deploy_all(run);
        self.close(run, result)
    }

    fn deploy_all(&mut self, run: &mut OrchestrationRun) -> Result<()> {
        for idx in 0..run.total() {
            let state = self.deploy_unit(run, idx)?;
            self.progress.finish_unit(&run.unit(idx).name, state);
            self.settle(run, idx)?;
        }
        Ok(())
    }

    /// Finish the progress display and record a fatal abort
    pub(crate) fn close(&mut self, run: &mut OrchestrationRun, result: Result<()>) -> Result<()> {
        match result {
            Ok(()) => {
                self.progress.finish();
                Ok(())
            }
            Err(e) => {
                self.progress.abandon();
                tracing::error!(error = %e, attempted = run.attempted(), "run aborted");
                run.abort(&e);
                Err(e)
            }
        }
    }

    /// Take unit `idx` from `PENDING` to `DEPLOYED`, `FAILED` or `SKIPPED`
    ///
    /// Unit failures are recorded on the run and returned as the final
    /// state. `Err` means the run must stop.
    pub fn deploy_unit(&mut self, run: &mut OrchestrationRun, idx: usize) -> Result<UnitState> {
        let unit = run.unit(idx).clone();
        self.progress.start_unit(&unit.name, idx + 1, run.total());

        let choice = self.lookup(&unit);
        if choice == Some(ReplaceChoice::Skip) {
            tracing::info!(unit = %unit.name, "unit already live, skipping");
            run.transition(idx, UnitState::Skipped)?;
            run.record_error(idx, &unit::already_exists(&unit.name));
            return Ok(UnitState::Skipped);
        }

        self.progress.phase("checking resources");
        let check = self
            .guard
            .check(&format!("before unit '{}'", unit.name), &run.finished_units())?;
        log_guard(run, &check);

        run.transition(idx, UnitState::Deploying)?;

        if choice == Some(ReplaceChoice::Replace) {
            self.progress.phase("removing live instance");
            if let Err(e) = self.ledger.remove(&unit) {
                return self.fail(run, idx, &e);
            }
        }

        self.progress.phase("deploying");
        if let Err(e) = self.ledger.deploy(&unit, self.policy.deploy_timeout) {
            return self.fail(run, idx, &e);
        }

        self.progress.phase("stabilizing");
        self.pause
            .pause(PauseKind::Stabilization, self.policy.stabilization);

        run.transition(idx, UnitState::Deployed)?;
        tracing::info!(unit = %unit.label(), "unit deployed");
        Ok(UnitState::Deployed)
    }

    /// Post-check after unit `idx`'s cycle: reclaim finished units' leftovers
    ///
    /// After the last unit no deploy is left to protect, so exhaustion there
    /// becomes a warning on that unit instead of a fatal abort.
    pub fn settle(&mut self, run: &mut OrchestrationRun, idx: usize) -> Result<()> {
        let checkpoint = format!("after unit '{}'", run.unit(idx).name);
        match self.guard.settle(&checkpoint, &run.finished_units()) {
            Ok(check) => {
                log_guard(run, &check);
                Ok(())
            }
            Err(e @ ChainrollError::ResourceExhausted { .. }) if idx + 1 == run.total() => {
                tracing::warn!(error = %e, "resources exhausted after the last unit");
                run.record_warning(idx, &e);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Remove unit `idx`'s deployed instance at the end of a test cycle
    pub(crate) fn remove(&mut self, unit: &DeploymentUnit) -> Result<()> {
        self.ledger.remove(unit)
    }

    pub(crate) fn pause(&mut self, kind: PauseKind, duration: Duration) {
        self.pause.pause(kind, duration);
    }

    pub(crate) fn progress(&mut self) -> &mut dyn ProgressReporter {
        &mut *self.progress
    }

    /// Look for live instances and decide; `None` when the unit is not live
    fn lookup(&mut self, unit: &DeploymentUnit) -> Option<ReplaceChoice> {
        let instances = match self.ledger.live_instances(unit) {
            Ok(instances) => instances,
            Err(e) => {
                tracing::warn!(unit = %unit.name, error = %e, "live instance lookup failed, assuming none");
                return None;
            }
        };
        if instances.is_empty() {
            return None;
        }

        let decision = &mut *self.decision;
        let mut choice = ReplaceChoice::Skip;
        self.progress
            .suspend(&mut || choice = decision.decide(unit, &instances));
        Some(choice)
    }

    fn fail(
        &mut self,
        run: &mut OrchestrationRun,
        idx: usize,
        err: &ChainrollError,
    ) -> Result<UnitState> {
        tracing::warn!(unit = %run.unit(idx).name, error = %err, "unit failed, continuing");
        run.transition(idx, UnitState::Failed)?;
        run.record_error(idx, err);
        Ok(UnitState::Failed)
    }
}

fn log_guard(run: &mut OrchestrationRun, check: &GuardCheck) {
    run.log_mut().event("resource_check", json!(check));
}
