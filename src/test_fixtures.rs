//! Test fixtures and fakes shared by unit tests.
//!
//! The fakes stand in for the external world chainroll drives: the ledger
//! network, the host's memory and containers, the API process and its HTTP
//! answers. A [`FakeCluster`] holds the shared state; the ledger, probe and
//! reclaimer fakes handed out by it all see the same cluster, so a deploy
//! leaves containers behind that a later sample counts and a reclaim removes.
//!
//! # Usage
//!
//! ```ignore
//! use crate::test_fixtures::{FakeCluster, fake_guard, healthcare_units};
//!
//! #[test]
//! fn my_test() {
//!     let cluster = FakeCluster::new();
//!     cluster.time_out_deploy("consent");
//!     let mut ledger = cluster.ledger();
//!     let mut guard = fake_guard(&cluster);
//!     // ... drive a run, then inspect `cluster`
//! }
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::rc::Rc;
use std::time::Duration;

use serde_json::{Value, json};
use tempfile::TempDir;

use crate::config::ResourceConfig;
use crate::domain::{DeploymentUnit, ResourceSnapshot, TestCase};
use crate::error::{Result, network, unit};
use crate::isolation::{ApiClient, ApiLauncher, ApiProcess, ApiResponse};
use crate::ledger::LedgerNetwork;
use crate::network::NetworkProbe;
use crate::pause::{Pause, PauseKind};
use crate::resource::{Reclaimer, ResourceGuard, ResourceProbe};

/// Memory fraction reported when no scripted value is queued
const BASELINE_MEMORY: f64 = 0.40;

/// Ephemeral containers a fake deploy leaves behind
const EPHEMERAL_PER_DEPLOY: usize = 2;

/// Create a temp directory in the system temp location.
///
/// # Panics
///
/// Panics if the temp directory cannot be created.
#[must_use]
pub fn create_temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp directory")
}

/// The built-in five-unit healthcare registry
#[must_use]
pub fn healthcare_units() -> Vec<DeploymentUnit> {
    crate::config::registry::default_units()
}

/// Guard over a [`FakeCluster`] with default thresholds
#[must_use]
pub fn fake_guard(cluster: &FakeCluster) -> ResourceGuard {
    ResourceGuard::new(
        Box::new(ScriptedProbe::new(cluster)),
        Box::new(cluster.reclaimer()),
        ResourceConfig::default(),
    )
}

/// Network probe answering with a fixed process list
pub struct StaticNetworkProbe {
    running: Option<Vec<String>>,
}

impl StaticNetworkProbe {
    #[must_use]
    pub fn running(names: &[&str]) -> Self {
        Self {
            running: Some(names.iter().map(ToString::to_string).collect()),
        }
    }

    /// A probe whose listing command itself fails
    #[must_use]
    pub fn failing() -> Self {
        Self { running: None }
    }
}

impl NetworkProbe for StaticNetworkProbe {
    fn running_processes(&self) -> Result<Vec<String>> {
        self.running
            .clone()
            .ok_or_else(|| crate::error::process::failed("docker ps", "daemon not running"))
    }
}

#[derive(Default)]
struct ClusterState {
    /// Live instances per unit name
    live: BTreeMap<String, usize>,
    /// Ephemeral containers per unit name
    ephemeral: BTreeMap<String, usize>,
    memory: VecDeque<f64>,
    memory_on_lookup: HashMap<String, Vec<f64>>,
    fail_next_sample: bool,
    fail_reclaim: bool,
    timeouts: HashSet<String>,
    removal_failures: HashSet<String>,
    deploy_order: Vec<String>,
    removals: Vec<String>,
    purges: usize,
    samples: usize,
    deploys_in_flight: usize,
    max_concurrent_deploys: usize,
    max_live_units: usize,
}

impl ClusterState {
    fn live_units(&self) -> usize {
        self.live.values().filter(|count| **count > 0).count()
    }

    fn note_live(&mut self) {
        self.max_live_units = self.max_live_units.max(self.live_units());
    }
}

/// Shared in-memory ledger network and host
#[derive(Clone, Default)]
pub struct FakeCluster {
    state: Rc<RefCell<ClusterState>>,
}

impl FakeCluster {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue memory fractions returned by the next samples, in order
    pub fn script_memory(&self, values: &[f64]) {
        self.state.borrow_mut().memory.extend(values);
    }

    /// Replace the memory queue when `unit` is looked up
    ///
    /// Lets a test put memory pressure exactly before a unit's pre-check,
    /// however many samples earlier units took.
    pub fn script_memory_on_lookup(&self, unit: &str, values: &[f64]) {
        self.state
            .borrow_mut()
            .memory_on_lookup
            .insert(unit.to_string(), values.to_vec());
    }

    pub fn spawn_ephemeral(&self, unit: &str, count: usize) {
        *self
            .state
            .borrow_mut()
            .ephemeral
            .entry(unit.to_string())
            .or_default() += count;
    }

    #[must_use]
    pub fn ephemeral_for(&self, unit: &str) -> usize {
        self.state
            .borrow()
            .ephemeral
            .get(unit)
            .copied()
            .unwrap_or(0)
    }

    #[must_use]
    pub fn purges(&self) -> usize {
        self.state.borrow().purges
    }

    #[must_use]
    pub fn samples(&self) -> usize {
        self.state.borrow().samples
    }

    pub fn fail_next_sample(&self) {
        self.state.borrow_mut().fail_next_sample = true;
    }

    pub fn fail_reclaim(&self) {
        self.state.borrow_mut().fail_reclaim = true;
    }

    pub fn time_out_deploy(&self, unit: &str) {
        self.state.borrow_mut().timeouts.insert(unit.to_string());
    }

    /// Register a live instance before the run starts
    pub fn preinstall(&self, unit: &str) {
        let mut state = self.state.borrow_mut();
        *state.live.entry(unit.to_string()).or_default() += 1;
        state.note_live();
    }

    pub fn fail_removal(&self, unit: &str) {
        self.state
            .borrow_mut()
            .removal_failures
            .insert(unit.to_string());
    }

    #[must_use]
    pub fn live_count(&self, unit: &str) -> usize {
        self.state.borrow().live.get(unit).copied().unwrap_or(0)
    }

    /// Units whose deploy was attempted, in order
    #[must_use]
    pub fn deploy_order(&self) -> Vec<String> {
        self.state.borrow().deploy_order.clone()
    }

    #[must_use]
    pub fn removals(&self) -> Vec<String> {
        self.state.borrow().removals.clone()
    }

    #[must_use]
    pub fn max_concurrent_deploys(&self) -> usize {
        self.state.borrow().max_concurrent_deploys
    }

    #[must_use]
    pub fn max_live_units(&self) -> usize {
        self.state.borrow().max_live_units
    }

    #[must_use]
    pub fn ledger(&self) -> FakeLedger {
        FakeLedger {
            cluster: self.clone(),
        }
    }

    #[must_use]
    pub fn reclaimer(&self) -> FakeReclaimer {
        FakeReclaimer {
            cluster: self.clone(),
        }
    }
}

/// Ledger backed by a [`FakeCluster`]
pub struct FakeLedger {
    cluster: FakeCluster,
}

impl LedgerNetwork for FakeLedger {
    fn live_instances(&mut self, unit: &DeploymentUnit) -> Result<Vec<String>> {
        let mut state = self.cluster.state.borrow_mut();
        if let Some(values) = state.memory_on_lookup.remove(&unit.name) {
            state.memory = values.into();
        }
        let count = state.live.get(&unit.name).copied().unwrap_or(0);
        Ok((0..count)
            .map(|i| format!("{}_{}:{i}", unit.name, unit.version))
            .collect())
    }

    fn remove(&mut self, unit: &DeploymentUnit) -> Result<()> {
        let mut state = self.cluster.state.borrow_mut();
        if state.removal_failures.contains(&unit.name) {
            return Err(unit::remove_failed(&unit.name, "peer refused removal"));
        }
        state.live.remove(&unit.name);
        state.removals.push(unit.name.clone());
        Ok(())
    }

    fn deploy(&mut self, unit: &DeploymentUnit, timeout: Duration) -> Result<()> {
        let mut state = self.cluster.state.borrow_mut();
        state.deploy_order.push(unit.name.clone());
        state.deploys_in_flight += 1;
        state.max_concurrent_deploys = state.max_concurrent_deploys.max(state.deploys_in_flight);

        let result = if state.timeouts.contains(&unit.name) {
            Err(unit::deploy_timeout(&unit.name, timeout.as_secs()))
        } else {
            *state.live.entry(unit.name.clone()).or_default() += 1;
            *state.ephemeral.entry(unit.name.clone()).or_default() += EPHEMERAL_PER_DEPLOY;
            state.note_live();
            Ok(())
        };
        state.deploys_in_flight -= 1;
        result
    }
}

/// Probe reading memory from the cluster's script
pub struct ScriptedProbe {
    cluster: FakeCluster,
}

impl ScriptedProbe {
    #[must_use]
    pub fn new(cluster: &FakeCluster) -> Self {
        Self {
            cluster: cluster.clone(),
        }
    }
}

impl ResourceProbe for ScriptedProbe {
    fn sample(&mut self, tracked: &[String]) -> Result<ResourceSnapshot> {
        let mut state = self.cluster.state.borrow_mut();
        state.samples += 1;
        if std::mem::take(&mut state.fail_next_sample) {
            return Err(network::probe_failed("/proc/meminfo: permission denied"));
        }

        let memory = state.memory.pop_front().unwrap_or(BASELINE_MEMORY);
        let mut snapshot = ResourceSnapshot::new(memory, 0.2);
        for unit in tracked {
            let stale = state.ephemeral.get(unit).copied().unwrap_or(0);
            snapshot = snapshot.with_stale(unit, stale);
        }
        Ok(snapshot)
    }
}

/// Reclaimer clearing the cluster's ephemeral containers
pub struct FakeReclaimer {
    cluster: FakeCluster,
}

impl Reclaimer for FakeReclaimer {
    fn reclaim(&mut self, unit: &str) -> Result<()> {
        let mut state = self.cluster.state.borrow_mut();
        if state.fail_reclaim {
            return Err(crate::error::process::failed(
                format!("docker rm -f dev-peer0-{unit}"),
                "exit code 1: container is in use",
            ));
        }
        state.ephemeral.remove(unit);
        Ok(())
    }

    fn purge(&mut self) -> Result<()> {
        self.cluster.state.borrow_mut().purges += 1;
        Ok(())
    }
}

/// Records pauses instead of sleeping
#[derive(Debug, Default)]
pub struct RecordingPause {
    pauses: Vec<(PauseKind, Duration)>,
}

impl RecordingPause {
    #[must_use]
    pub fn count(&self, kind: PauseKind) -> usize {
        self.pauses.iter().filter(|(k, _)| *k == kind).count()
    }

    #[must_use]
    pub fn total(&self, kind: PauseKind) -> Duration {
        self.pauses
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, d)| *d)
            .sum()
    }
}

impl Pause for RecordingPause {
    fn pause(&mut self, kind: PauseKind, duration: Duration) {
        self.pauses.push((kind, duration));
    }
}

/// API client answering every test the way it expects
///
/// Paths registered with [`ScriptedClient::fail_path`] get a 500 instead.
#[derive(Debug, Default)]
pub struct ScriptedClient {
    failing: Vec<String>,
}

impl ScriptedClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn fail_path(mut self, path: &str) -> Self {
        self.failing.push(path.to_string());
        self
    }
}

impl ApiClient for ScriptedClient {
    fn send(&self, _base_url: &str, test: &TestCase) -> Result<ApiResponse> {
        if self.failing.contains(&test.path) {
            return Ok(ApiResponse {
                status: 500,
                body: r#"{"error":"internal"}"#.to_string(),
            });
        }

        let mut body = json!({});
        if let Some(ref expected) = test.expect.json {
            set_pointer(&mut body, &expected.pointer, expected.equals.clone());
        }
        if let Some(ref needle) = test.expect.contains {
            body["echo"] = json!(needle);
        }
        Ok(ApiResponse {
            status: test.expect.status.unwrap_or(200),
            body: body.to_string(),
        })
    }
}

fn set_pointer(root: &mut Value, pointer: &str, value: Value) {
    let segments: Vec<&str> = pointer.split('/').skip(1).collect();
    let Some((last, parents)) = segments.split_last() else {
        return;
    };
    let mut current = root;
    for segment in parents {
        current = current
            .as_object_mut()
            .unwrap()
            .entry(segment.to_string())
            .or_insert_with(|| json!({}));
    }
    current.as_object_mut().unwrap().insert(last.to_string(), value);
}

#[derive(Default)]
struct LauncherState {
    launched: usize,
    running: usize,
    max_running: usize,
}

/// Launcher handing out in-memory API processes
#[derive(Default)]
pub struct FakeLauncher {
    state: Rc<RefCell<LauncherState>>,
    start_failures: HashSet<String>,
    shutdown_failures: HashSet<String>,
}

impl FakeLauncher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn fail_for(mut self, unit: &str) -> Self {
        self.start_failures.insert(unit.to_string());
        self
    }

    #[must_use]
    pub fn fail_shutdown_for(mut self, unit: &str) -> Self {
        self.shutdown_failures.insert(unit.to_string());
        self
    }

    #[must_use]
    pub fn launched(&self) -> usize {
        self.state.borrow().launched
    }

    #[must_use]
    pub fn running(&self) -> usize {
        self.state.borrow().running
    }

    #[must_use]
    pub fn max_running(&self) -> usize {
        self.state.borrow().max_running
    }
}

impl ApiLauncher for FakeLauncher {
    fn launch(&mut self, unit: &DeploymentUnit) -> Result<Box<dyn ApiProcess>> {
        if self.start_failures.contains(&unit.name) {
            return Err(unit::api_start_failed(&unit.name, "exited with exit status: 1"));
        }
        let mut state = self.state.borrow_mut();
        state.launched += 1;
        state.running += 1;
        state.max_running = state.max_running.max(state.running);
        Ok(Box::new(FakeApi {
            unit: unit.name.clone(),
            state: Rc::clone(&self.state),
            stopped: false,
            fail_shutdown: self.shutdown_failures.contains(&unit.name),
        }))
    }
}

struct FakeApi {
    unit: String,
    state: Rc<RefCell<LauncherState>>,
    stopped: bool,
    fail_shutdown: bool,
}

impl ApiProcess for FakeApi {
    fn base_url(&self) -> &str {
        "http://127.0.0.1:3000"
    }

    fn shutdown(&mut self) -> Result<()> {
        if !self.stopped {
            self.stopped = true;
            self.state.borrow_mut().running -= 1;
        }
        if self.fail_shutdown {
            return Err(unit::teardown_failed(&self.unit, "kill API process: EPERM"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_temp_dir() {
        let temp = create_temp_dir();
        assert!(temp.path().exists());
    }

    #[test]
    fn test_deploy_leaves_ephemeral_containers() {
        let cluster = FakeCluster::new();
        let unit = DeploymentUnit::new("patient", "cc/patient");
        cluster.ledger().deploy(&unit, Duration::from_secs(1)).unwrap();

        assert_eq!(cluster.live_count("patient"), 1);
        assert_eq!(cluster.ephemeral_for("patient"), EPHEMERAL_PER_DEPLOY);
        let snapshot = ScriptedProbe::new(&cluster)
            .sample(&["patient".to_string()])
            .unwrap();
        assert_eq!(snapshot.stale_for("patient"), EPHEMERAL_PER_DEPLOY);
    }

    #[test]
    fn test_scripted_client_satisfies_expectations() {
        let client = ScriptedClient::new();
        for unit in healthcare_units() {
            for test in &unit.tests {
                let response = client.send("http://127.0.0.1:3000", test).unwrap();
                assert!(
                    crate::isolation::battery::evaluate(test, &response).passed,
                    "{} should pass",
                    test.name
                );
            }
        }
    }

    #[test]
    fn test_set_pointer_builds_nested_objects() {
        let mut value = json!({});
        set_pointer(&mut value, "/data/name", json!("Ada"));
        assert_eq!(value, json!({"data": {"name": "Ada"}}));
    }
}
