//! chainroll - sequential deploy-and-test orchestrator
//!
//! Deploys the units of a ledger application one at a time, in a fixed
//! order, gated on network health and host resources, and optionally tests
//! each unit in isolation through a short-lived API process.

use clap::Parser;
use miette::Diagnostic;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod config;
mod domain;
mod error;
mod isolation;
mod ledger;
mod network;
mod orchestrator;
mod pause;
mod process;
mod report;
mod resource;
mod scheduler;
mod ui;

#[cfg(test)]
mod test_fixtures;

use cli::{Cli, Commands};
use error::Result;

/// Console diagnostics on stderr; `RUST_LOG` overrides the level
fn init_tracing(verbose: bool, json: bool) {
    let default = if verbose { "chainroll=debug" } else { "chainroll=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

fn dispatch(cli: Cli) -> Result<i32> {
    let config = cli.config.as_deref();
    match cli.command {
        Commands::Deploy(ref args) => commands::deploy::run(config, cli.quiet, args),
        Commands::Test(ref args) => commands::test::run(config, cli.quiet, args),
        Commands::Check => commands::check::run(config),
        Commands::Monitor(ref args) => commands::monitor::run(config, args).map(|()| 0),
        Commands::Units => commands::units::run(config).map(|()| 0),
        Commands::Version => commands::version::run().map(|()| 0),
        Commands::Completions(ref args) => commands::completions::run(args).map(|()| 0),
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let code = match dispatch(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            if let Some(help) = e.help() {
                eprintln!("  help: {help}");
            }
            e.exit_code()
        }
    };
    std::process::exit(code);
}
