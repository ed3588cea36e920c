//! Continuous resource-usage log
//!
//! Operators run `chainroll monitor` next to a rollout. It samples at a fixed
//! interval and appends one JSON line per sample; it never touches the run.

use std::time::Duration;

use serde_json::json;

use super::ResourceProbe;
use super::guard::classify;
use crate::config::ResourceConfig;
use crate::pause::{Pause, PauseKind};
use crate::report::log::RunLog;

/// Samples resources on an interval into a JSON-lines log
pub struct ResourceMonitor {
    probe: Box<dyn ResourceProbe>,
    thresholds: ResourceConfig,
    tracked: Vec<String>,
    interval: Duration,
}

impl ResourceMonitor {
    pub fn new(
        probe: Box<dyn ResourceProbe>,
        thresholds: ResourceConfig,
        tracked: Vec<String>,
        interval: Duration,
    ) -> Self {
        Self {
            probe,
            thresholds,
            tracked,
            interval,
        }
    }

    /// Take `count` samples (forever when `None`); returns the samples logged
    ///
    /// `on_sample` sees each summary line as it is logged.
    pub fn run(
        &mut self,
        count: Option<u64>,
        log: &mut RunLog,
        pause: &mut dyn Pause,
        mut on_sample: impl FnMut(&str),
    ) -> u64 {
        let mut taken = 0u64;
        while count.is_none_or(|c| taken < c) {
            if taken > 0 {
                pause.pause(PauseKind::Interval, self.interval);
            }
            taken += 1;

            match self.probe.sample(&self.tracked) {
                Ok(snapshot) => {
                    let verdict = classify(&self.thresholds, &snapshot);
                    log.event(
                        "resource_sample",
                        json!({ "verdict": verdict, "snapshot": snapshot }),
                    );
                    on_sample(&format!("{verdict:>5} | {}", snapshot.summary()));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "resource sample failed");
                    log.event("resource_sample_failed", json!({ "error": e.to_string() }));
                }
            }
        }
        taken
    }
}
