//! Check command implementation
//!
//! One network health probe and one resource snapshot, without touching any
//! unit. Exit codes match a run's preconditions: 3 unreachable, 4 blocked.

use std::path::Path;

use console::Style;

use super::helpers;
use crate::error::{EXIT_NETWORK_UNREACHABLE, EXIT_RESOURCE_EXHAUSTED, Result};
use crate::network::Health;
use crate::resource::{ResourceProbe, Verdict, guard};

/// Returns the process exit code
pub fn run(config: Option<&Path>) -> Result<i32> {
    let loaded = helpers::load_config(config)?;
    let config = &loaded.config;
    let label = Style::new().bold();

    let health = helpers::network_checker(config).check();
    match health {
        Health::Healthy => println!(
            "{} {}",
            label.apply_to("network:  "),
            Style::new().green().apply_to("healthy")
        ),
        Health::Unreachable { ref missing } => println!(
            "{} {} (missing {})",
            label.apply_to("network:  "),
            Style::new().red().bold().apply_to("unreachable"),
            missing.join(", ")
        ),
    }

    let tracked: Vec<String> = loaded
        .registry
        .units()
        .iter()
        .map(|u| u.name.clone())
        .collect();
    let snapshot = helpers::host_probe(config).sample(&tracked)?;
    let verdict = guard::classify(&config.resources, &snapshot);
    let style = match verdict {
        Verdict::Ok => Style::new().green(),
        Verdict::Warn => Style::new().yellow(),
        Verdict::Block => Style::new().red().bold(),
    };
    println!(
        "{} {} | {}",
        label.apply_to("resources:"),
        style.apply_to(verdict),
        snapshot.summary()
    );

    if let Err(e) = health.into_result() {
        if let Some(hint) = e.remediation() {
            println!("  {} {}", Style::new().cyan().apply_to("help:"), hint);
        }
        return Ok(EXIT_NETWORK_UNREACHABLE);
    }
    if verdict == Verdict::Block {
        return Ok(EXIT_RESOURCE_EXHAUSTED);
    }
    Ok(0)
}
