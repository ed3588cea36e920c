//! Common test utilities for chainroll integration tests
//!
//! A [`TestWorkspace`] is a temp directory holding a `chainroll.yaml` whose
//! ledger collaborator is a handful of `sh` one-liners over a `state/`
//! directory: deploying a unit touches `state/<name>`, removing it deletes the
//! file, and the network probe echoes the core process names.

use std::path::PathBuf;

use assert_cmd::Command;
use tempfile::TempDir;

/// Port for the API process in test mode; tests using it run serially
#[allow(dead_code)]
pub const API_PORT: u16 = 38_417;

/// A test workspace for integration tests
pub struct TestWorkspace {
    /// Temporary directory
    #[allow(dead_code)]
    pub temp: TempDir,
    /// Path to workspace root
    pub path: PathBuf,
}

/// Knobs for the generated configuration
#[derive(Debug, Clone)]
pub struct Ledger {
    pub network_up: bool,
    /// Unit whose deploy hangs past the timeout, with a background helper
    /// that writes `state/<unit>.late` if it survives
    pub hang_on: Option<&'static str>,
    pub deploy_timeout_secs: u64,
    pub api_command: String,
}

impl Default for Ledger {
    fn default() -> Self {
        Self {
            network_up: true,
            hang_on: None,
            deploy_timeout_secs: 10,
            api_command: "false".to_string(),
        }
    }
}

impl TestWorkspace {
    /// Create a new test workspace
    pub fn new() -> Self {
        let temp = TempDir::new().expect("Failed to create temp directory");
        let path = temp.path().to_path_buf();
        std::fs::create_dir_all(path.join("state")).expect("Failed to create state directory");
        Self { temp, path }
    }

    /// Workspace with `chainroll.yaml` written from `ledger`
    pub fn with_ledger(ledger: &Ledger) -> Self {
        let workspace = Self::new();
        workspace.write_file("chainroll.yaml", &config_yaml(ledger, ""));
        workspace
    }

    /// Write a file in workspace
    pub fn write_file(&self, path: &str, content: &str) {
        let file_path = self.path.join(path);
        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        std::fs::write(&file_path, content).expect("Failed to write file");
    }

    /// Check if a file exists in workspace
    pub fn file_exists(&self, path: &str) -> bool {
        self.path.join(path).exists()
    }

    /// Mark a unit as already live
    #[allow(dead_code)]
    pub fn preinstall(&self, unit: &str) {
        self.write_file(&format!("state/{unit}"), "");
    }

    /// Contents of the only run log with `prefix` under `logs/`
    #[allow(dead_code)]
    pub fn run_log(&self, prefix: &str) -> Vec<serde_json::Value> {
        let logs = std::fs::read_dir(self.path.join("logs")).expect("No logs directory");
        let path = logs
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .find(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(prefix))
            })
            .expect("No run log written");
        std::fs::read_to_string(path)
            .expect("Failed to read run log")
            .lines()
            .map(|line| serde_json::from_str(line).expect("Run log line is not JSON"))
            .collect()
    }

    /// The chainroll binary, run inside the workspace
    pub fn chainroll(&self) -> Command {
        #[allow(deprecated)]
        let mut cmd = Command::cargo_bin("chainroll").expect("chainroll binary not built");
        cmd.current_dir(&self.path)
            .env_remove("CHAINROLL_CONFIG")
            .env_remove("RUST_LOG")
            .timeout(std::time::Duration::from_secs(120));
        cmd
    }
}

/// `chainroll.yaml` for a shell-driven fake ledger, plus `extra` YAML
pub fn config_yaml(ledger: &Ledger, extra: &str) -> String {
    let probe = if ledger.network_up {
        "echo orderer.example.com; echo peer0.org1.example.com"
    } else {
        "echo unrelated-container"
    };
    let deploy = match ledger.hang_on {
        Some(unit) => format!(
            "if [ {{name}} = {unit} ]; then (sleep 3; touch state/{{name}}.late) & sleep 30; fi; touch state/{{name}}"
        ),
        None => "touch state/{name}".to_string(),
    };

    format!(
        r#"network:
  probe: "{probe}"
  required_processes: [orderer.example.com, peer0.org1.example.com]
commands:
  deploy: "{deploy}"
  verify: "test -f state/{{name}}"
  instances: "if [ -f state/{{name}} ]; then echo dev-peer0-{{name}}_{{version}}; fi"
  remove: "rm -f state/{{name}}"
  ephemeral: null
  reclaim: null
  purge: null
timing:
  deploy_timeout_secs: {timeout}
  verify_interval_secs: 1
  stabilization_secs: 0
  recovery_secs: 0
  command_timeout_secs: 10
resources:
  warn_memory: 0.99
  block_memory: 1.0
api:
  command: "{api}"
  port: {port}
  startup_timeout_secs: 5
  request_timeout_secs: 2
logs:
  dir: logs
{extra}"#,
        timeout = ledger.deploy_timeout_secs,
        api = ledger.api_command,
        port = API_PORT,
    )
}
