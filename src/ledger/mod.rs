//! Ledger network collaborator
//!
//! The ledger is a black box that installs, lists and removes units. The
//! scheduler only sees success, timeout or error through [`LedgerNetwork`].

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::{CommandsConfig, NetworkConfig, TimingConfig};
use crate::domain::DeploymentUnit;
use crate::error::{ChainrollError, Result, unit};
use crate::process::ShellCommand;

/// Operations the orchestrator needs from the ledger network
pub trait LedgerNetwork {
    /// Live instances registered under the unit's name
    fn live_instances(&mut self, unit: &DeploymentUnit) -> Result<Vec<String>>;

    /// Remove every live instance of the unit
    fn remove(&mut self, unit: &DeploymentUnit) -> Result<()>;

    /// Install and commit the unit, returning once it reports deployed
    ///
    /// Must fail with `DeploymentTimeout` when `timeout` elapses first.
    fn deploy(&mut self, unit: &DeploymentUnit, timeout: Duration) -> Result<()>;
}

/// Ledger driven by the configured command templates
pub struct ShellLedger {
    commands: CommandsConfig,
    working_dir: Option<PathBuf>,
    command_timeout: Duration,
    verify_interval: Duration,
}

impl ShellLedger {
    pub fn new(commands: &CommandsConfig, network: &NetworkConfig, timing: &TimingConfig) -> Self {
        Self {
            commands: commands.clone(),
            working_dir: network.working_dir.clone(),
            command_timeout: timing.command_timeout(),
            verify_interval: timing.verify_interval(),
        }
    }

    fn command(&self, template: &str, unit: &DeploymentUnit, timeout: Duration) -> ShellCommand {
        ShellCommand::for_unit(template, unit, timeout).in_dir(self.working_dir.as_deref())
    }

    /// Poll the verify command until it succeeds or `deadline` passes
    fn wait_deployed(
        &self,
        verify: &str,
        unit: &DeploymentUnit,
        deadline: Instant,
        timeout_secs: u64,
    ) -> Result<()> {
        let mut attempts = 0u32;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(unit::deploy_timeout(&unit.name, timeout_secs));
            }

            attempts += 1;
            match self.command(verify, unit, remaining.min(self.command_timeout)).run() {
                Ok(output) if output.success => {
                    tracing::debug!(unit = %unit.name, attempts, "unit reported deployed");
                    return Ok(());
                }
                Ok(output) => {
                    tracing::debug!(
                        unit = %unit.name,
                        attempts,
                        reason = %output.failure_reason(),
                        "unit not deployed yet"
                    );
                }
                Err(ChainrollError::CommandTimedOut { .. }) => {}
                Err(e) => return Err(unit::deploy_failed(&unit.name, e.to_string())),
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            thread::sleep(self.verify_interval.min(remaining));
        }
    }
}

impl LedgerNetwork for ShellLedger {
    fn live_instances(&mut self, unit: &DeploymentUnit) -> Result<Vec<String>> {
        let output = self
            .command(&self.commands.instances, unit, self.command_timeout)
            .run_checked()?;
        Ok(output.lines())
    }

    fn remove(&mut self, unit: &DeploymentUnit) -> Result<()> {
        self.command(&self.commands.remove, unit, self.command_timeout)
            .run_checked()
            .map(|_| ())
            .map_err(|e| unit::remove_failed(&unit.name, e.to_string()))
    }

    fn deploy(&mut self, unit: &DeploymentUnit, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let timeout_secs = timeout.as_secs();

        tracing::info!(unit = %unit.label(), policy = %unit.policy, "deploying unit");
        let output = match self.command(&self.commands.deploy, unit, timeout).run() {
            Ok(output) => output,
            Err(ChainrollError::CommandTimedOut { .. }) => {
                return Err(unit::deploy_timeout(&unit.name, timeout_secs));
            }
            Err(e) => return Err(unit::deploy_failed(&unit.name, e.to_string())),
        };
        if !output.success {
            return Err(unit::deploy_failed(&unit.name, output.failure_reason()));
        }

        match self.commands.verify {
            Some(ref verify) => self.wait_deployed(verify, unit, deadline, timeout_secs),
            None => Ok(()),
        }
    }
}
