//! Ledger network health check
//!
//! The check is a read-only probe of the core processes (ordering service and
//! peers). It gates the whole run: an unreachable network means no unit is
//! attempted.

use std::path::PathBuf;
use std::time::Duration;

use crate::config::NetworkConfig;
use crate::error::{ChainrollError, Result, network};
use crate::process::ShellCommand;

/// Lists the names of the processes/containers currently running
pub trait NetworkProbe {
    fn running_processes(&self) -> Result<Vec<String>>;
}

/// Probe that runs the configured listing command
pub struct ShellNetworkProbe {
    command: String,
    working_dir: Option<PathBuf>,
    timeout: Duration,
}

impl ShellNetworkProbe {
    pub fn new(config: &NetworkConfig, timeout: Duration) -> Self {
        Self {
            command: config.probe.clone(),
            working_dir: config.working_dir.clone(),
            timeout,
        }
    }
}

impl NetworkProbe for ShellNetworkProbe {
    fn running_processes(&self) -> Result<Vec<String>> {
        let output = ShellCommand::new(&self.command, self.timeout)
            .in_dir(self.working_dir.as_deref())
            .run_checked()?;
        Ok(output.lines())
    }
}

/// Verdict of a health check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Health {
    Healthy,
    Unreachable { missing: Vec<String> },
}

impl Health {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Health::Healthy)
    }

    /// The fatal error for an unreachable verdict
    pub fn into_result(self) -> Result<()> {
        match self {
            Health::Healthy => Ok(()),
            Health::Unreachable { missing } => Err(network::unreachable(missing)),
        }
    }
}

/// Checks that every required core process is running
pub struct NetworkHealthChecker {
    required: Vec<String>,
    probe: Box<dyn NetworkProbe>,
}

impl NetworkHealthChecker {
    pub fn new(required: Vec<String>, probe: Box<dyn NetworkProbe>) -> Self {
        Self { required, probe }
    }

    /// Checker using the configured probe command
    pub fn from_config(config: &NetworkConfig, timeout: Duration) -> Self {
        Self::new(
            config.required_processes.clone(),
            Box::new(ShellNetworkProbe::new(config, timeout)),
        )
    }

    /// Probe once; a failing probe counts as unreachable
    pub fn check(&self) -> Health {
        let running = match self.probe.running_processes() {
            Ok(running) => running,
            Err(e) => {
                tracing::warn!(error = %e, "network probe failed");
                return Health::Unreachable {
                    missing: vec![probe_failure(&e)],
                };
            }
        };

        let missing: Vec<String> = self
            .required
            .iter()
            .filter(|required| !running.iter().any(|name| is_match(name, required)))
            .cloned()
            .collect();

        if missing.is_empty() {
            tracing::info!(processes = self.required.len(), "ledger network is healthy");
            Health::Healthy
        } else {
            tracing::warn!(missing = ?missing, "ledger network is missing core processes");
            Health::Unreachable { missing }
        }
    }
}

/// Container names may carry a prefix or suffix (`/peer0.org1.example.com`)
fn is_match(running: &str, required: &str) -> bool {
    running == required || running.trim_start_matches('/').contains(required)
}

fn probe_failure(err: &ChainrollError) -> String {
    format!("all core processes (probe failed: {err})")
}
