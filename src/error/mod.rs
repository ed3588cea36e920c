//! Error types and handling for chainroll
//!
//! Uses `thiserror` for error definitions and `miette` for diagnostics. Every
//! variant carries a `help` line that doubles as the remediation hint printed
//! next to failed units and fatal aborts.
//!
//! This module is organized into sub-modules by error domain:
//! - [`config`]: Configuration and registry errors
//! - [`network`]: Ledger network and resource gate errors
//! - [`unit`]: Per-unit deployment, teardown and assertion errors
//! - [`process`]: External command and HTTP errors

pub mod config;
pub mod network;
pub mod process;
pub mod unit;

use miette::Diagnostic;
use thiserror::Error;

/// Exit code for unit failures (partial or total).
pub const EXIT_UNIT_FAILURES: i32 = 1;
/// Exit code when the ledger network is unreachable at start.
pub const EXIT_NETWORK_UNREACHABLE: i32 = 3;
/// Exit code when the resource gate could not recover.
pub const EXIT_RESOURCE_EXHAUSTED: i32 = 4;
/// Exit code for any other error that stops chainroll before or outside a run.
pub const EXIT_FATAL: i32 = 5;

/// Main error type for chainroll operations
#[derive(Error, Diagnostic, Debug)]
pub enum ChainrollError {
    // Fatal preconditions
    #[error("Ledger network is unreachable: missing {missing}")]
    #[diagnostic(
        code(chainroll::network::unreachable),
        help(
            "Start the ledger network (e.g. './network.sh up createChannel') and make sure the orderer and peer containers are running"
        )
    )]
    NetworkUnreachable { missing: String },

    #[error("Resources exhausted {checkpoint}: memory at {memory_percent:.1}% after cleanup")]
    #[diagnostic(
        code(chainroll::resources::exhausted),
        help(
            "Free memory before re-running: remove stale containers ('docker container prune -f'), stop unrelated workloads, or raise resources.block_memory"
        )
    )]
    ResourceExhausted {
        checkpoint: String,
        memory_percent: f64,
    },

    #[error("Failed to sample host resources: {reason}")]
    #[diagnostic(
        code(chainroll::resources::probe_failed),
        help("chainroll reads /proc/meminfo and /proc/loadavg; run it on a Linux host")
    )]
    ProbeFailed { reason: String },

    // Unit errors
    #[error("Unit '{unit}' did not report deployed within {timeout_secs}s")]
    #[diagnostic(
        code(chainroll::unit::deploy_timeout),
        help(
            "Inspect the peer logs ('docker logs peer0.org1.example.com'), then raise timing.deploy_timeout_secs if the build is just slow"
        )
    )]
    DeploymentTimeout { unit: String, timeout_secs: u64 },

    #[error("Deployment of unit '{unit}' failed: {reason}")]
    #[diagnostic(
        code(chainroll::unit::deploy_failed),
        help("Check the unit's artifact path, version and sequence number against the channel's committed definition")
    )]
    DeploymentFailed { unit: String, reason: String },

    #[error("Unit '{unit}' is already deployed and was not replaced")]
    #[diagnostic(
        code(chainroll::unit::already_exists),
        help("Re-run with --replace to redeploy it")
    )]
    UnitAlreadyExists { unit: String },

    #[error("Failed to remove existing instance of unit '{unit}': {reason}")]
    #[diagnostic(
        code(chainroll::unit::remove_failed),
        help("Remove the stale unit containers by hand ('docker rm -f $(docker ps -aq --filter name=dev-peer)')")
    )]
    RemovalFailed { unit: String, reason: String },

    #[error("API process for unit '{unit}' did not start: {reason}")]
    #[diagnostic(
        code(chainroll::unit::api_start_failed),
        help("Make sure api.port is free and api.command starts the server from api.working_dir")
    )]
    ApiStartFailed { unit: String, reason: String },

    #[error("Teardown of unit '{unit}' left resources behind: {reason}")]
    #[diagnostic(
        code(chainroll::unit::teardown_failed),
        help("Stop the stray process or container by hand; the run continued")
    )]
    TeardownFailed { unit: String, reason: String },

    #[error("Assertion '{test}' failed: expected {condition}, {detail}")]
    #[diagnostic(code(chainroll::unit::assertion_failed))]
    TestAssertionFailed {
        test: String,
        condition: String,
        detail: String,
    },

    #[error("Unit '{unit}' cannot move from {from} to {to}")]
    #[diagnostic(code(chainroll::unit::invalid_transition))]
    InvalidTransition {
        unit: String,
        from: String,
        to: String,
    },

    // External command errors
    #[error("Command timed out after {timeout_secs}s: {command}")]
    #[diagnostic(
        code(chainroll::process::timed_out),
        help("Raise timing.command_timeout_secs or check that the command does not wait for input")
    )]
    CommandTimedOut { command: String, timeout_secs: u64 },

    #[error("Command failed: {command}: {reason}")]
    #[diagnostic(code(chainroll::process::failed))]
    CommandFailed { command: String, reason: String },

    #[error("HTTP request to {url} failed: {reason}")]
    #[diagnostic(code(chainroll::process::http_failed))]
    HttpRequestFailed { url: String, reason: String },

    // Configuration errors
    #[error("Configuration file not found: {path}")]
    #[diagnostic(
        code(chainroll::config::not_found),
        help("Pass an existing file with --config or unset CHAINROLL_CONFIG to use the built-in registry")
    )]
    ConfigNotFound { path: String },

    #[error("Failed to parse configuration file: {path}: {reason}")]
    #[diagnostic(code(chainroll::config::parse_failed))]
    ConfigParseFailed { path: String, reason: String },

    #[error("Invalid configuration: {message}")]
    #[diagnostic(code(chainroll::config::invalid))]
    ConfigInvalid { message: String },

    #[error("Failed to read configuration file: {path}")]
    #[diagnostic(code(chainroll::config::read_failed))]
    ConfigReadFailed { path: String, reason: String },

    // Log sink errors
    #[error("Failed to write run log: {path}: {reason}")]
    #[diagnostic(
        code(chainroll::log::write_failed),
        help("Check that logs.dir is writable")
    )]
    LogWriteFailed { path: String, reason: String },

    #[error("IO error: {message}")]
    #[diagnostic(code(chainroll::io::error))]
    IoError { message: String },
}

impl ChainrollError {
    /// Whether this error cancels the remaining run
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::NetworkUnreachable { .. } | Self::ResourceExhausted { .. }
        )
    }

    /// Process exit code when this error ends chainroll
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NetworkUnreachable { .. } => EXIT_NETWORK_UNREACHABLE,
            Self::ResourceExhausted { .. } => EXIT_RESOURCE_EXHAUSTED,
            _ => EXIT_FATAL,
        }
    }

    /// Remediation hint taken from the diagnostic help text
    pub fn remediation(&self) -> Option<String> {
        self.help().map(|help| help.to_string())
    }
}

impl From<std::io::Error> for ChainrollError {
    fn from(err: std::io::Error) -> Self {
        ChainrollError::IoError {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for ChainrollError {
    fn from(err: serde_yaml::Error) -> Self {
        ChainrollError::ConfigParseFailed {
            path: "unknown".to_string(),
            reason: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for ChainrollError {
    fn from(err: serde_json::Error) -> Self {
        ChainrollError::IoError {
            message: format!("JSON serialization failed: {err}"),
        }
    }
}

impl From<reqwest::Error> for ChainrollError {
    fn from(err: reqwest::Error) -> Self {
        ChainrollError::HttpRequestFailed {
            url: err
                .url()
                .map_or_else(|| "unknown".to_string(), ToString::to_string),
            reason: err.to_string(),
        }
    }
}

impl From<inquire::InquireError> for ChainrollError {
    fn from(err: inquire::InquireError) -> Self {
        ChainrollError::IoError {
            message: err.to_string(),
        }
    }
}

/// Result type alias using miette for error handling
pub type Result<T> = miette::Result<T, ChainrollError>;
