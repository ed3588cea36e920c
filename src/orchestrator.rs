//! Top-level run orchestration
//!
//! The network health check gates the whole run. When it passes, the chosen
//! driver walks the registry; whatever happens, the caller gets the run back
//! for reporting.

use serde_json::json;

use crate::domain::{DeploymentUnit, OrchestrationRun, RunMode};
use crate::isolation::{ApiClient, ApiLauncher, IsolatedTestRunner};
use crate::ledger::LedgerNetwork;
use crate::network::{Health, NetworkHealthChecker};
use crate::pause::Pause;
use crate::report::log::RunLog;
use crate::resource::ResourceGuard;
use crate::scheduler::{DeploymentScheduler, ReplaceDecision, RunPolicy};
use crate::ui::ProgressReporter;

/// Which driver walks the registry
pub enum Driver<'a> {
    /// Deployment only
    Deploy,
    /// Isolated deploy, test and teardown cycles
    Test {
        launcher: &'a mut dyn ApiLauncher,
        client: &'a dyn ApiClient,
    },
}

impl Driver<'_> {
    pub fn mode(&self) -> RunMode {
        match self {
            Driver::Deploy => RunMode::Deploy,
            Driver::Test { .. } => RunMode::Test,
        }
    }
}

/// External collaborators shared by both drivers
pub struct Collaborators<'a> {
    pub health: &'a NetworkHealthChecker,
    pub ledger: &'a mut dyn LedgerNetwork,
    pub guard: &'a mut ResourceGuard,
    pub decision: &'a mut dyn ReplaceDecision,
    pub pause: &'a mut dyn Pause,
    pub progress: &'a mut dyn ProgressReporter,
}

/// Run `units` in order and return the finished run
///
/// Fatal preconditions are recorded on the returned run, never returned as
/// errors, so the caller always has a run to summarize.
pub fn orchestrate(
    units: Vec<DeploymentUnit>,
    log: RunLog,
    policy: RunPolicy,
    driver: Driver<'_>,
    collab: Collaborators<'_>,
) -> OrchestrationRun {
    let mut run = OrchestrationRun::new(driver.mode(), units, log);

    let health = collab.health.check();
    let missing = match health {
        Health::Healthy => Vec::new(),
        Health::Unreachable { ref missing } => missing.clone(),
    };
    run.log_mut().event(
        "network_health",
        json!({ "healthy": health.is_healthy(), "missing": missing }),
    );
    if let Err(e) = health.into_result() {
        tracing::error!(error = %e, "ledger network unreachable, no unit attempted");
        run.abort(&e);
        return run;
    }

    let scheduler = DeploymentScheduler::new(
        collab.ledger,
        collab.guard,
        collab.decision,
        collab.pause,
        collab.progress,
        policy,
    );
    let mut scheduler = scheduler;
    let result = match driver {
        Driver::Deploy => scheduler.run(&mut run),
        Driver::Test { launcher, client } => {
            IsolatedTestRunner::new(scheduler, launcher, client).run(&mut run)
        }
    };
    if let Err(e) = result {
        tracing::debug!(error = %e, "run ended early");
    }
    run
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::UnitState;
    use crate::error::EXIT_NETWORK_UNREACHABLE;
    use crate::scheduler::SkipExisting;
    use crate::test_fixtures::{
        FakeCluster, RecordingPause, StaticNetworkProbe, fake_guard, healthcare_units,
    };
    use crate::ui::SilentProgressReporter;
    use std::time::Duration;

    fn policy() -> RunPolicy {
        RunPolicy {
            deploy_timeout: Duration::from_secs(1),
            stabilization: Duration::ZERO,
            recovery: Duration::ZERO,
        }
    }

    #[test]
    fn test_unreachable_network_attempts_nothing() {
        let cluster = FakeCluster::new();
        let health = NetworkHealthChecker::new(
            vec!["orderer.example.com".to_string()],
            Box::new(StaticNetworkProbe::running(&[])),
        );
        let mut ledger = cluster.ledger();
        let mut guard = fake_guard(&cluster);

        let run = orchestrate(
            healthcare_units(),
            RunLog::disabled(),
            policy(),
            Driver::Deploy,
            Collaborators {
                health: &health,
                ledger: &mut ledger,
                guard: &mut guard,
                decision: &mut SkipExisting,
                pause: &mut RecordingPause::default(),
                progress: &mut SilentProgressReporter,
            },
        );

        assert_eq!(run.attempted(), 0);
        assert!(run.records().iter().all(|r| r.state() == UnitState::Pending));
        assert_eq!(run.fatal().unwrap().exit_code, EXIT_NETWORK_UNREACHABLE);
        assert!(cluster.deploy_order().is_empty());
        assert_eq!(cluster.samples(), 0);
    }

    #[test]
    fn test_healthy_network_runs_driver() {
        let cluster = FakeCluster::new();
        let health = NetworkHealthChecker::new(
            vec!["orderer.example.com".to_string()],
            Box::new(StaticNetworkProbe::running(&["orderer.example.com"])),
        );
        let mut ledger = cluster.ledger();
        let mut guard = fake_guard(&cluster);

        let run = orchestrate(
            healthcare_units(),
            RunLog::disabled(),
            policy(),
            Driver::Deploy,
            Collaborators {
                health: &health,
                ledger: &mut ledger,
                guard: &mut guard,
                decision: &mut SkipExisting,
                pause: &mut RecordingPause::default(),
                progress: &mut SilentProgressReporter,
            },
        );

        assert!(run.fatal().is_none());
        assert_eq!(run.counters().deployed, 5);
        assert!(run.is_balanced());
    }
}
