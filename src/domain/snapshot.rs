//! Point-in-time view of host resources

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Immutable resource sample taken at a guard checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub taken_at: DateTime<Utc>,

    /// Fraction of physical memory in use, 0.0..=1.0
    pub memory_used: f64,

    /// One-minute load average divided by the number of CPUs
    pub cpu_load: f64,

    /// Fraction of the watched filesystem in use, when it could be read
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_used: Option<f64>,

    /// Ephemeral processes/containers still tagged with an already finished unit
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub stale_by_unit: BTreeMap<String, usize>,
}

impl ResourceSnapshot {
    pub fn new(memory_used: f64, cpu_load: f64) -> Self {
        Self {
            taken_at: Utc::now(),
            memory_used,
            cpu_load,
            disk_used: None,
            stale_by_unit: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_disk(mut self, disk_used: f64) -> Self {
        self.disk_used = Some(disk_used);
        self
    }

    #[must_use]
    pub fn with_stale(mut self, unit: impl Into<String>, count: usize) -> Self {
        if count > 0 {
            self.stale_by_unit.insert(unit.into(), count);
        }
        self
    }

    /// Total stale ephemeral processes across finished units
    pub fn stale_processes(&self) -> usize {
        self.stale_by_unit.values().sum()
    }

    /// Stale ephemeral processes tagged with `unit`
    pub fn stale_for(&self, unit: &str) -> usize {
        self.stale_by_unit.get(unit).copied().unwrap_or(0)
    }

    pub fn memory_percent(&self) -> f64 {
        self.memory_used * 100.0
    }

    /// One-line summary for console output
    pub fn summary(&self) -> String {
        let disk = self
            .disk_used
            .map_or_else(|| "n/a".to_string(), |d| format!("{:.1}%", d * 100.0));
        format!(
            "mem {:.1}% | cpu {:.2} | disk {} | stale {}",
            self.memory_percent(),
            self.cpu_load,
            disk,
            self.stale_processes()
        )
    }
}
