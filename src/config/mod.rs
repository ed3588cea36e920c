//! Configuration file handling for chainroll
//!
//! This module contains data structures for `chainroll.yaml`:
//! - [`sections`] - network, command, timing, resource, API and log settings
//! - [`registry`] - the ordered unit registry and its built-in default
//!
//! Lookup order for the file:
//! 1. `--config <path>` (or `CHAINROLL_CONFIG`), which must exist
//! 2. `./chainroll.yaml`
//! 3. `<config dir>/chainroll/chainroll.yaml`
//! 4. Built-in defaults

pub mod registry;
pub mod sections;

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::DeploymentUnit;
use crate::error::{Result, config};

pub use registry::UnitRegistry;
pub use sections::{
    ApiConfig, CommandsConfig, LogConfig, NetworkConfig, ResourceConfig, TimingConfig,
};

/// File name looked up in the current directory and the user config dir
pub const CONFIG_FILE: &str = "chainroll.yaml";

/// Complete chainroll configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChainrollConfig {
    pub network: NetworkConfig,
    pub commands: CommandsConfig,
    pub timing: TimingConfig,
    pub resources: ResourceConfig,
    pub api: ApiConfig,
    pub logs: LogConfig,

    /// Replaces the built-in registry when present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub units: Option<Vec<DeploymentUnit>>,
}

/// A loaded configuration and where it came from
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: ChainrollConfig,
    pub registry: UnitRegistry,
    /// `None` when running on built-in defaults
    pub source: Option<PathBuf>,
}

impl ChainrollConfig {
    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        // An empty file deserializes to unit, not to an empty mapping
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Read and parse a configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(config::not_found(path.display().to_string()));
        }
        let content = fs::read_to_string(path)
            .map_err(|e| config::read_failed(path.display().to_string(), e.to_string()))?;
        Self::from_yaml(&content)
            .map_err(|e| config::parse_failed(path.display().to_string(), e.to_string()))
    }

    /// Validate every section and build the registry
    pub fn registry(&self) -> Result<UnitRegistry> {
        self.timing.validate()?;
        self.resources.validate()?;
        self.api.validate()?;
        if self.network.required_processes.is_empty() {
            return Err(config::invalid(
                "network.required_processes must name at least one core process",
            ));
        }
        match self.units {
            Some(ref units) => UnitRegistry::new(units.clone()),
            None => Ok(UnitRegistry::builtin()),
        }
    }

    /// Resolve the configuration file and load it
    pub fn load(explicit: Option<&Path>) -> Result<LoadedConfig> {
        let source = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => discover(),
        };

        let config = match source {
            Some(ref path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let registry = config.registry()?;

        tracing::debug!(
            source = ?source,
            units = registry.len(),
            "configuration loaded"
        );

        Ok(LoadedConfig {
            config,
            registry,
            source,
        })
    }
}

/// Find an implicit configuration file
fn discover() -> Option<PathBuf> {
    let local = PathBuf::from(CONFIG_FILE);
    if local.is_file() {
        return Some(local);
    }

    let global = dirs::config_dir()?.join("chainroll").join(CONFIG_FILE);
    global.is_file().then_some(global)
}
