//! CLI definitions using clap derive API
//!
//! This module is organized into submodules for each command's argument types:
//! - run: Deploy and test command arguments
//! - monitor: Monitor command arguments
//! - completions: Completions command arguments

use clap::builder::{Styles, styling::AnsiColor};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod completions;
pub mod monitor;
pub mod run;

pub use completions::CompletionsArgs;
pub use monitor::MonitorArgs;
pub use run::RunArgs;

/// chainroll - sequential deploy-and-test orchestrator
///
/// Deploys ledger service units one at a time, in a fixed order, gated on
/// network health and host resources.
#[derive(Parser, Debug)]
#[command(
    name = "chainroll",
    author,
    version,
    color = clap::ColorChoice::Always,
    styles = Styles::styled()
        .header(AnsiColor::Green.on_default().bold())
        .usage(AnsiColor::Green.on_default().bold())
        .literal(AnsiColor::Cyan.on_default().bold())
        .placeholder(AnsiColor::Cyan.on_default()),
    about = "Sequential, resource-gated deploy-and-test orchestrator for ledger service units",
    long_about = "chainroll deploys the units of a ledger application one at a time, in registry \
                  order, checking the network and host resources before and after every unit. \
                  In test mode each unit is deployed alone, exercised through a short-lived API \
                  process and removed again before the next one starts.",
    after_help = "\x1b[1m\x1b[32mExamples:\x1b[0m\n    \
                  chainroll check\n    \
                  chainroll deploy\n    \
                  chainroll deploy --replace\n    \
                  chainroll test --skip-existing\n    \
                  chainroll monitor --interval 5 --output logs/resources.jsonl\n\n\
                  \x1b[1m\x1b[32mExit codes:\x1b[0m\n    \
                  0 success, 1 unit failures, 2 usage error,\n    \
                  3 network unreachable, 4 resources exhausted, 5 other fatal error"
)]
pub struct Cli {
    /// Configuration file (defaults to ./chainroll.yaml, then the user config dir)
    #[arg(long, short = 'c', global = true, env = "CHAINROLL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Suppress progress bars
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Emit diagnostic logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Deploy every unit in registry order
    Deploy(RunArgs),

    /// Deploy, test and remove each unit in isolation
    Test(RunArgs),

    /// Check network health and host resources
    Check,

    /// Log host resource usage continuously
    Monitor(MonitorArgs),

    /// List units in rollout order
    Units,

    /// Show version information
    Version,

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_replace_conflicts_with_skip_existing() {
        let result = Cli::try_parse_from(["chainroll", "deploy", "--replace", "--skip-existing"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["chainroll", "test", "-q", "--config", "x.yaml"]).unwrap();
        assert!(cli.quiet);
        assert_eq!(cli.config, Some(PathBuf::from("x.yaml")));
        assert!(matches!(cli.command, Commands::Test(_)));
    }
}
