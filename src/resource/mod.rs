//! Host resource sampling
//!
//! This module handles:
//! - Sampling memory, CPU load, disk usage and ephemeral containers ([`HostProbe`])
//! - Gating each step of a run on those samples ([`guard`])
//! - The continuous resource log for operators ([`monitor`])

pub mod guard;
pub mod monitor;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::{CommandsConfig, NetworkConfig, ResourceConfig};
use crate::domain::ResourceSnapshot;
use crate::error::{Result, network};
use crate::process::ShellCommand;

pub use guard::{GuardCheck, Reclaimer, ResourceGuard, ShellReclaimer, Verdict};
pub use monitor::ResourceMonitor;

/// Takes resource snapshots
///
/// Ephemeral processes are attributed to the units named in `tracked`; names
/// that match no tracked unit are ignored.
pub trait ResourceProbe {
    fn sample(&mut self, tracked: &[String]) -> Result<ResourceSnapshot>;
}

/// Probe reading `/proc` and the configured container listing
pub struct HostProbe {
    meminfo: PathBuf,
    loadavg: PathBuf,
    disk_path: PathBuf,
    ephemeral: Option<String>,
    working_dir: Option<PathBuf>,
    timeout: Duration,
}

impl HostProbe {
    pub fn new(
        resources: &ResourceConfig,
        commands: &CommandsConfig,
        network: &NetworkConfig,
        timeout: Duration,
    ) -> Self {
        Self {
            meminfo: PathBuf::from("/proc/meminfo"),
            loadavg: PathBuf::from("/proc/loadavg"),
            disk_path: resources.disk_path.clone(),
            ephemeral: commands.ephemeral.clone(),
            working_dir: network.working_dir.clone(),
            timeout,
        }
    }

    /// Read memory and load from other files (fixtures, containers with a remapped /proc)
    #[must_use]
    pub fn with_proc_files(mut self, meminfo: impl Into<PathBuf>, loadavg: impl Into<PathBuf>) -> Self {
        self.meminfo = meminfo.into();
        self.loadavg = loadavg.into();
        self
    }

    fn disk_used(&self) -> Option<f64> {
        let output = ShellCommand::new("df -Pk -- \"$1\"", self.timeout)
            .with_arg(&self.disk_path)
            .run_checked();
        match output.map(|o| parse_df(&o.stdout)) {
            Ok(Ok(used)) => Some(used),
            Ok(Err(e)) | Err(e) => {
                tracing::debug!(path = %self.disk_path.display(), error = %e, "disk usage unavailable");
                None
            }
        }
    }

    fn ephemeral_names(&self) -> Vec<String> {
        let Some(ref command) = self.ephemeral else {
            return Vec::new();
        };
        match ShellCommand::new(command, self.timeout)
            .in_dir(self.working_dir.as_deref())
            .run_checked()
        {
            Ok(output) => output.lines(),
            Err(e) => {
                tracing::warn!(error = %e, "listing ephemeral processes failed");
                Vec::new()
            }
        }
    }
}

impl ResourceProbe for HostProbe {
    fn sample(&mut self, tracked: &[String]) -> Result<ResourceSnapshot> {
        let meminfo = read_proc(&self.meminfo)?;
        let loadavg = read_proc(&self.loadavg)?;
        let cpus = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);

        let mut snapshot = ResourceSnapshot::new(parse_meminfo(&meminfo)?, parse_loadavg(&loadavg, cpus)?);
        if let Some(disk) = self.disk_used() {
            snapshot = snapshot.with_disk(disk);
        }
        let names = self.ephemeral_names();
        for unit in tracked {
            snapshot = snapshot.with_stale(unit, count_tagged(&names, unit));
        }
        Ok(snapshot)
    }
}

fn read_proc(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .map_err(|e| network::probe_failed(format!("{}: {e}", path.display())))
}

/// Fraction of memory in use: `1 - MemAvailable / MemTotal`
pub fn parse_meminfo(content: &str) -> Result<f64> {
    let field = |key: &str| -> Option<f64> {
        content
            .lines()
            .find_map(|line| line.strip_prefix(key))
            .and_then(|rest| rest.trim_start_matches(':').split_whitespace().next())
            .and_then(|kb| kb.parse::<f64>().ok())
    };

    let total = field("MemTotal").filter(|t| *t > 0.0);
    let available = field("MemAvailable").or_else(|| {
        // Kernels before 3.14 have no MemAvailable
        Some(field("MemFree")? + field("Buffers").unwrap_or(0.0) + field("Cached").unwrap_or(0.0))
    });

    match (total, available) {
        (Some(total), Some(available)) => Ok((1.0 - available / total).clamp(0.0, 1.0)),
        _ => Err(network::probe_failed("meminfo has no MemTotal/MemAvailable")),
    }
}

/// One-minute load average divided by `cpus`
pub fn parse_loadavg(content: &str, cpus: usize) -> Result<f64> {
    let one_minute = content
        .split_whitespace()
        .next()
        .and_then(|v| v.parse::<f64>().ok())
        .ok_or_else(|| network::probe_failed(format!("unreadable loadavg '{}'", content.trim())))?;
    #[allow(clippy::cast_precision_loss)]
    Ok(one_minute / cpus.max(1) as f64)
}

/// Used fraction from POSIX `df -P` output
pub fn parse_df(content: &str) -> Result<f64> {
    let row = content
        .lines()
        .nth(1)
        .ok_or_else(|| network::probe_failed("df printed no filesystem row"))?;
    let fields: Vec<&str> = row.split_whitespace().collect();
    let number = |idx: usize| fields.get(idx).and_then(|v| v.parse::<f64>().ok());
    match (number(2), number(3)) {
        (Some(used), Some(available)) if used + available > 0.0 => Ok(used / (used + available)),
        _ => Err(network::probe_failed(format!("unreadable df row '{row}'"))),
    }
}

/// Names tagged with `unit`
///
/// The unit name must stand alone and must not continue with `-`, so
/// `patient` matches `dev-peer0-patient_1.0` but not `patient-history_1.0`.
pub fn count_tagged(names: &[String], unit: &str) -> usize {
    names.iter().filter(|name| is_tagged(name, unit)).count()
}

fn is_tagged(name: &str, unit: &str) -> bool {
    name.match_indices(unit).any(|(idx, _)| {
        let before = name[..idx].chars().next_back();
        let after = name[idx + unit.len()..].chars().next();
        before.is_none_or(|c| !c.is_ascii_alphanumeric())
            && after.is_none_or(|c| !c.is_ascii_alphanumeric() && c != '-')
    })
}
