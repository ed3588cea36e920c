//! Configuration sections of chainroll.yaml
//!
//! Every section has built-in defaults matching a stock Fabric test network,
//! so an empty file (or no file) is a valid configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, config};

/// Ledger network liveness probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkConfig {
    /// Command printing one running process/container name per line
    pub probe: String,

    /// Core processes that must all be running
    pub required_processes: Vec<String>,

    /// Directory the ledger commands run in
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            probe: "docker ps --format '{{.Names}}'".to_string(),
            required_processes: vec![
                "orderer.example.com".to_string(),
                "peer0.org1.example.com".to_string(),
                "peer0.org2.example.com".to_string(),
            ],
            working_dir: None,
        }
    }
}

/// Command templates for the ledger collaborator
///
/// Templates may use `{name}`, `{version}`, `{sequence}`, `{policy}` and
/// `{path}`; the same values are exported as `CHAINROLL_UNIT_*` variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CommandsConfig {
    /// Package, install, approve and commit one unit
    pub deploy: String,

    /// Exits 0 once the unit is committed and answering; polled after deploy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify: Option<String>,

    /// Prints one line per live instance of the unit
    pub instances: String,

    /// Removes every live instance of the unit
    pub remove: String,

    /// Prints one line per ephemeral process/container (any unit)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ephemeral: Option<String>,

    /// Reclaims the ephemeral processes of one finished unit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reclaim: Option<String>,

    /// Purges caches once per cleanup pass
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purge: Option<String>,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            deploy: "./network.sh deployCC -ccn {name} -ccp {path} -ccl javascript \
                     -ccv {version} -ccs {sequence} -ccep \"{policy}\""
                .to_string(),
            verify: Some(
                "peer lifecycle chaincode querycommitted --channelID mychannel --name {name}"
                    .to_string(),
            ),
            instances: "docker ps --filter 'name=dev-peer' --format '{{.Names}}' | grep -- '-{name}_' || true"
                .to_string(),
            remove: "docker ps -a --format '{{.ID}} {{.Names}}' | grep -- ' dev-peer.*-{name}_' \
                     | cut -d' ' -f1 | xargs -r docker rm -f"
                .to_string(),
            ephemeral: Some(
                "docker ps -a --filter 'status=exited' --format '{{.Names}}'".to_string(),
            ),
            reclaim: Some(
                "docker ps -a --filter 'status=exited' --format '{{.ID}} {{.Names}}' \
                 | grep -- ' .*-{name}_' | cut -d' ' -f1 | xargs -r docker rm -f"
                    .to_string(),
            ),
            purge: Some("docker container prune -f".to_string()),
        }
    }
}

/// Waits and pauses, all in seconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimingConfig {
    /// Bound on deploy + verify for one unit
    pub deploy_timeout_secs: u64,
    /// Delay between verify attempts
    pub verify_interval_secs: u64,
    /// Pause after a successful deploy before declaring it deployed
    pub stabilization_secs: u64,
    /// Pause between test cycles
    pub recovery_secs: u64,
    /// Bound on every auxiliary command (probe, list, remove, reclaim)
    pub command_timeout_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            deploy_timeout_secs: 300,
            verify_interval_secs: 3,
            stabilization_secs: 10,
            recovery_secs: 5,
            command_timeout_secs: 60,
        }
    }
}

impl TimingConfig {
    pub fn deploy_timeout(&self) -> Duration {
        Duration::from_secs(self.deploy_timeout_secs)
    }

    pub fn verify_interval(&self) -> Duration {
        Duration::from_secs(self.verify_interval_secs)
    }

    pub fn stabilization(&self) -> Duration {
        Duration::from_secs(self.stabilization_secs)
    }

    pub fn recovery(&self) -> Duration {
        Duration::from_secs(self.recovery_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.deploy_timeout_secs == 0 {
            return Err(config::invalid("timing.deploy_timeout_secs must be positive"));
        }
        if self.command_timeout_secs == 0 {
            return Err(config::invalid(
                "timing.command_timeout_secs must be positive",
            ));
        }
        Ok(())
    }
}

/// Resource gate thresholds, as fractions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResourceConfig {
    pub warn_memory: f64,
    pub block_memory: f64,
    pub warn_disk: f64,
    /// Filesystem watched for the disk warning
    pub disk_path: PathBuf,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            warn_memory: 0.75,
            block_memory: 0.90,
            warn_disk: 0.90,
            disk_path: PathBuf::from("."),
        }
    }
}

impl ResourceConfig {
    pub fn validate(&self) -> Result<()> {
        for (key, value) in [
            ("warn_memory", self.warn_memory),
            ("block_memory", self.block_memory),
            ("warn_disk", self.warn_disk),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(config::invalid(format!(
                    "resources.{key} must be a fraction in (0, 1], got {value}"
                )));
            }
        }
        if self.warn_memory >= self.block_memory {
            return Err(config::invalid(format!(
                "resources.warn_memory ({}) must be below resources.block_memory ({})",
                self.warn_memory, self.block_memory
            )));
        }
        Ok(())
    }
}

/// Ephemeral API process used by the test runner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApiConfig {
    /// Starts the API server in the foreground; killed after each cycle
    pub command: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,

    /// Fixed port reused by every cycle
    pub port: u16,

    /// Path polled until it answers 2xx
    pub ready_path: String,

    pub startup_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            command: "node server.js".to_string(),
            working_dir: None,
            port: 3000,
            ready_path: "/health".to_string(),
            startup_timeout_secs: 30,
            request_timeout_secs: 10,
        }
    }
}

impl ApiConfig {
    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.command.trim().is_empty() {
            return Err(config::invalid("api.command cannot be empty"));
        }
        if self.port == 0 {
            return Err(config::invalid("api.port must be a fixed, non-zero port"));
        }
        if !self.ready_path.starts_with('/') {
            return Err(config::invalid(format!(
                "api.ready_path must start with '/', got '{}'",
                self.ready_path
            )));
        }
        Ok(())
    }
}

/// Where run logs go
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    pub dir: PathBuf,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("logs"),
        }
    }
}
