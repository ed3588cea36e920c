//! Resource gate around every unit step
//!
//! The guard runs before a unit's deploy and after its teardown, never while
//! a unit is in flight. A blocked sample triggers one cleanup pass over the
//! already finished units and one re-sample; a second block is fatal.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ResourceProbe;
use crate::config::{CommandsConfig, NetworkConfig, ResourceConfig};
use crate::domain::ResourceSnapshot;
use crate::error::{Result, network};
use crate::process::ShellCommand;

/// Outcome of evaluating one snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Ok,
    Warn,
    Block,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Ok => f.pad("ok"),
            Verdict::Warn => f.pad("warn"),
            Verdict::Block => f.pad("block"),
        }
    }
}

/// Memory decides `Block`; memory or disk may `Warn`
pub fn classify(thresholds: &ResourceConfig, snapshot: &ResourceSnapshot) -> Verdict {
    if snapshot.memory_used >= thresholds.block_memory {
        return Verdict::Block;
    }
    let disk_high = snapshot
        .disk_used
        .is_some_and(|disk| disk >= thresholds.warn_disk);
    if snapshot.memory_used >= thresholds.warn_memory || disk_high {
        return Verdict::Warn;
    }
    Verdict::Ok
}

/// Frees resources held by units whose cycle is over
pub trait Reclaimer {
    /// Reclaim the ephemeral processes/containers of one finished unit
    fn reclaim(&mut self, unit: &str) -> Result<()>;

    /// Purge caches not tied to any unit
    fn purge(&mut self) -> Result<()>;
}

/// Reclaimer running the configured `reclaim` and `purge` commands
pub struct ShellReclaimer {
    reclaim: Option<String>,
    purge: Option<String>,
    working_dir: Option<PathBuf>,
    timeout: Duration,
}

impl ShellReclaimer {
    pub fn new(commands: &CommandsConfig, network: &NetworkConfig, timeout: Duration) -> Self {
        Self {
            reclaim: commands.reclaim.clone(),
            purge: commands.purge.clone(),
            working_dir: network.working_dir.clone(),
            timeout,
        }
    }

    fn run(&self, script: String) -> Result<()> {
        ShellCommand::new(script, self.timeout)
            .in_dir(self.working_dir.as_deref())
            .run_checked()
            .map(|_| ())
    }
}

impl Reclaimer for ShellReclaimer {
    fn reclaim(&mut self, unit: &str) -> Result<()> {
        match self.reclaim {
            Some(ref template) => self.run(template.replace("{name}", unit)),
            None => Ok(()),
        }
    }

    fn purge(&mut self) -> Result<()> {
        match self.purge {
            Some(ref script) => self.run(script.clone()),
            None => Ok(()),
        }
    }
}

/// What the guard saw at one checkpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GuardCheck {
    pub checkpoint: String,
    pub verdict: Verdict,
    /// Last snapshot taken; `None` when sampling failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<ResourceSnapshot>,
    /// Finished units whose leftovers were reclaimed
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reclaimed: Vec<String>,
    /// Whether a blocked sample recovered after cleanup
    pub recovered: bool,
}

/// Evaluates snapshots against thresholds and triggers cleanup
pub struct ResourceGuard {
    probe: Box<dyn ResourceProbe>,
    reclaimer: Box<dyn Reclaimer>,
    thresholds: ResourceConfig,
}

impl ResourceGuard {
    pub fn new(
        probe: Box<dyn ResourceProbe>,
        reclaimer: Box<dyn Reclaimer>,
        thresholds: ResourceConfig,
    ) -> Self {
        Self {
            probe,
            reclaimer,
            thresholds,
        }
    }

    pub fn thresholds(&self) -> &ResourceConfig {
        &self.thresholds
    }

    /// Take a fresh snapshot with ephemeral processes attributed to `tracked`
    pub fn sample(&mut self, tracked: &[String]) -> Result<ResourceSnapshot> {
        self.probe.sample(tracked)
    }

    pub fn evaluate(&self, snapshot: &ResourceSnapshot) -> Verdict {
        classify(&self.thresholds, snapshot)
    }

    /// Pre-check: sample, and on `Block` clean up once and re-sample
    ///
    /// `finished` must only name units whose cycle is over. A failed sample
    /// is logged and treated as `Ok`; only a measured block stops a run.
    pub fn check(&mut self, checkpoint: &str, finished: &[String]) -> Result<GuardCheck> {
        let snapshot = match self.sample(finished) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(checkpoint, error = %e, "resource sample failed, continuing");
                return Ok(GuardCheck {
                    checkpoint: checkpoint.to_string(),
                    verdict: Verdict::Ok,
                    snapshot: None,
                    reclaimed: Vec::new(),
                    recovered: false,
                });
            }
        };

        let verdict = self.evaluate(&snapshot);
        if verdict != Verdict::Block {
            self.report(checkpoint, verdict, &snapshot);
            return Ok(GuardCheck {
                checkpoint: checkpoint.to_string(),
                verdict,
                snapshot: Some(snapshot),
                reclaimed: Vec::new(),
                recovered: false,
            });
        }

        tracing::warn!(
            checkpoint,
            resources = %snapshot.summary(),
            "memory above block threshold, cleaning up"
        );
        let reclaimed = self.cleanup(finished, None);
        let after = self.sample(finished)?;
        let verdict = self.evaluate(&after);
        if verdict == Verdict::Block {
            return Err(network::exhausted(checkpoint, after.memory_percent()));
        }

        self.report(checkpoint, verdict, &after);
        Ok(GuardCheck {
            checkpoint: checkpoint.to_string(),
            verdict,
            snapshot: Some(after),
            reclaimed,
            recovered: true,
        })
    }

    /// Post-check: reclaim leftovers of finished units, then [`Self::check`]
    pub fn settle(&mut self, checkpoint: &str, finished: &[String]) -> Result<GuardCheck> {
        let before = match self.sample(finished) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                tracing::warn!(checkpoint, error = %e, "resource sample failed before cleanup");
                None
            }
        };
        let mut reclaimed = self.cleanup(finished, before.as_ref());
        let mut check = self.check(checkpoint, finished)?;
        for unit in check.reclaimed.drain(..) {
            if !reclaimed.contains(&unit) {
                reclaimed.push(unit);
            }
        }
        check.reclaimed = reclaimed;
        Ok(check)
    }

    /// Reclaim finished units and purge caches; failures are warnings
    ///
    /// With a snapshot only units that still have stale processes are
    /// reclaimed; without one every finished unit is.
    fn cleanup(&mut self, finished: &[String], snapshot: Option<&ResourceSnapshot>) -> Vec<String> {
        let targets: Vec<String> = finished
            .iter()
            .filter(|unit| snapshot.is_none_or(|s| s.stale_for(unit) > 0))
            .cloned()
            .collect();

        for unit in &targets {
            if let Err(e) = self.reclaimer.reclaim(unit) {
                tracing::warn!(unit = %unit, error = %e, "reclaiming unit leftovers failed");
            }
        }
        if let Err(e) = self.reclaimer.purge() {
            tracing::warn!(error = %e, "cache purge failed");
        }
        if !targets.is_empty() {
            tracing::info!(units = ?targets, "reclaimed ephemeral processes");
        }
        targets
    }

    fn report(&self, checkpoint: &str, verdict: Verdict, snapshot: &ResourceSnapshot) {
        match verdict {
            Verdict::Warn => tracing::warn!(
                checkpoint,
                resources = %snapshot.summary(),
                "resource usage above warning threshold"
            ),
            Verdict::Ok | Verdict::Block => tracing::debug!(
                checkpoint,
                resources = %snapshot.summary(),
                "resource check passed"
            ),
        }
    }
}
