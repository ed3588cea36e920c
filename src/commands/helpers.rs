//! Command helper utilities
//!
//! Builds the real collaborators (shell-driven ledger, host probe, terminal
//! progress) from a loaded configuration.

use std::io::IsTerminal;
use std::path::Path;

use crate::cli::RunArgs;
use crate::config::{ChainrollConfig, LoadedConfig};
use crate::domain::RunMode;
use crate::error::Result;
use crate::ledger::ShellLedger;
use crate::network::NetworkHealthChecker;
use crate::orchestrator::{Collaborators, Driver, orchestrate};
use crate::pause::ThreadPause;
use crate::report::log::RunLog;
use crate::report::{RunReport, render, summarize};
use crate::resource::{HostProbe, ResourceGuard, ShellReclaimer};
use crate::scheduler::{
    PromptDecision, ReplaceChoice, ReplaceDecision, ReplaceExisting, RunPolicy, SkipExisting,
};
use crate::ui::{InteractiveProgressReporter, ProgressReporter, SilentProgressReporter};

/// Load the configuration, logging where it came from
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    let loaded = ChainrollConfig::load(explicit)?;
    match loaded.source {
        Some(ref path) => tracing::info!(path = %path.display(), "using configuration file"),
        None => tracing::info!("no configuration file found, using built-in defaults"),
    }
    Ok(loaded)
}

/// Replace-or-skip policy for live units
///
/// Flags win; otherwise ask when stdin is a terminal and skip when it is not.
pub fn decision(args: &RunArgs) -> Box<dyn ReplaceDecision> {
    match args.forced_choice() {
        Some(ReplaceChoice::Replace) => Box::new(ReplaceExisting),
        Some(ReplaceChoice::Skip) => Box::new(SkipExisting),
        None if std::io::stdin().is_terminal() => Box::new(PromptDecision),
        None => Box::new(SkipExisting),
    }
}

/// Progress bar on a terminal, nothing otherwise
pub fn progress(total: usize, quiet: bool) -> Box<dyn ProgressReporter> {
    if quiet || !std::io::stderr().is_terminal() {
        Box::new(SilentProgressReporter)
    } else {
        Box::new(InteractiveProgressReporter::new(total as u64))
    }
}

pub fn network_checker(config: &ChainrollConfig) -> NetworkHealthChecker {
    NetworkHealthChecker::from_config(&config.network, config.timing.command_timeout())
}

pub fn host_probe(config: &ChainrollConfig) -> HostProbe {
    HostProbe::new(
        &config.resources,
        &config.commands,
        &config.network,
        config.timing.command_timeout(),
    )
}

pub fn resource_guard(config: &ChainrollConfig) -> ResourceGuard {
    ResourceGuard::new(
        Box::new(host_probe(config)),
        Box::new(ShellReclaimer::new(
            &config.commands,
            &config.network,
            config.timing.command_timeout(),
        )),
        config.resources.clone(),
    )
}

/// Per-run log file under `logs.dir`
pub fn run_log(config: &ChainrollConfig, mode: RunMode) -> Result<RunLog> {
    let log = RunLog::create(&config.logs.dir, mode.log_prefix())?;
    if let Some(path) = log.path() {
        tracing::info!(path = %path.display(), "writing run log");
    }
    Ok(log)
}

/// Print the run summary to stdout
pub fn print_report(report: &RunReport) {
    print!("{}", render(report));
}

/// Run every unit with `driver`, print the summary and return the exit code
pub fn execute(loaded: LoadedConfig, args: &RunArgs, quiet: bool, driver: Driver<'_>) -> Result<i32> {
    let LoadedConfig {
        config, registry, ..
    } = loaded;
    let units = registry.into_units();

    let log = run_log(&config, driver.mode())?;
    let health = network_checker(&config);
    let mut ledger = ShellLedger::new(&config.commands, &config.network, &config.timing);
    let mut guard = resource_guard(&config);
    let mut chooser = decision(args);
    let mut reporter = progress(units.len(), quiet);
    let mut pause = ThreadPause;

    let mut run = orchestrate(
        units,
        log,
        RunPolicy::from_timing(&config.timing),
        driver,
        Collaborators {
            health: &health,
            ledger: &mut ledger,
            guard: &mut guard,
            decision: chooser.as_mut(),
            pause: &mut pause,
            progress: reporter.as_mut(),
        },
    );

    let report = summarize(&mut run);
    print_report(&report);
    Ok(report.exit_code)
}
