//! Isolated test cycles
//!
//! Every unit gets its own cycle: deploy it alone, start one API process
//! against it, run its battery, stop the API process, remove the unit, then
//! reclaim and pause. Nothing from unit A's cycle is left when unit B's
//! cycle starts.

pub mod api;
pub mod battery;

use crate::domain::{AssertionResult, OrchestrationRun, UnitState};
use crate::error::{Result, unit};
use crate::pause::PauseKind;
use crate::scheduler::DeploymentScheduler;

pub use api::{ApiLauncher, ApiProcess, ShellApiLauncher};
pub use battery::{ApiClient, ApiResponse, HttpApiClient, execute_battery};

/// Runs the deploy, test and teardown cycle for each unit in turn
pub struct IsolatedTestRunner<'a> {
    scheduler: DeploymentScheduler<'a>,
    launcher: &'a mut dyn ApiLauncher,
    client: &'a dyn ApiClient,
}

impl<'a> IsolatedTestRunner<'a> {
    pub fn new(
        scheduler: DeploymentScheduler<'a>,
        launcher: &'a mut dyn ApiLauncher,
        client: &'a dyn ApiClient,
    ) -> Self {
        Self {
            scheduler,
            launcher,
            client,
        }
    }

    /// Test run over every unit
    pub fn run(&mut self, run: &mut OrchestrationRun) -> Result<()> {
        let result = self.test_all(run);
        self.scheduler.close(run, result)
    }

    fn test_all(&mut self, run: &mut OrchestrationRun) -> Result<()> {
        let total = run.total();
        for idx in 0..total {
            let state = match self.scheduler.deploy_unit(run, idx)? {
                UnitState::Deployed => self.test_unit(run, idx)?,
                other => other,
            };
            self.scheduler
                .progress()
                .finish_unit(&run.unit(idx).name, state);

            self.scheduler.settle(run, idx)?;
            if idx + 1 < total {
                let recovery = self.scheduler.policy().recovery;
                self.scheduler.pause(PauseKind::Recovery, recovery);
            }
        }
        Ok(())
    }

    /// Test a deployed unit and tear it down; returns `TESTED` or `TEST_FAILED`
    fn test_unit(&mut self, run: &mut OrchestrationRun, idx: usize) -> Result<UnitState> {
        let unit = run.unit(idx).clone();
        run.transition(idx, UnitState::Testing)?;

        self.scheduler.progress().phase("starting API");
        let results = match self.launcher.launch(&unit) {
            Ok(mut api) => {
                self.scheduler
                    .progress()
                    .phase(&format!("running {} tests", unit.tests.len()));
                let results = execute_battery(self.client, api.base_url(), &unit.tests);
                if let Err(e) = api.shutdown() {
                    run.record_warning(idx, &unit::teardown_failed(&unit.name, e.to_string()));
                }
                results
            }
            Err(e) => {
                tracing::warn!(unit = %unit.name, error = %e, "API did not start");
                run.record_error(idx, &e);
                unit.tests
                    .iter()
                    .map(|t| {
                        AssertionResult::fail(&t.name, t.expect.describe(), "API process did not start")
                    })
                    .collect()
            }
        };

        let passed = results.iter().filter(|r| r.passed).count();
        let total = results.len();
        run.record_assertions(idx, results);

        self.scheduler.progress().phase("removing unit");
        if let Err(e) = self.scheduler.remove(&unit) {
            run.record_warning(idx, &unit::teardown_failed(&unit.name, e.to_string()));
        }

        let state = if passed == total {
            UnitState::Tested
        } else {
            UnitState::TestFailed
        };
        tracing::info!(unit = %unit.name, passed, total, "battery finished");
        run.transition(idx, state)?;
        Ok(state)
    }
}
