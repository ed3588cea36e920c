//! Units command implementation

use std::path::Path;

use console::Style;

use super::helpers;
use crate::error::Result;

/// Print the resolved registry in rollout order
pub fn run(config: Option<&Path>) -> Result<()> {
    let loaded = helpers::load_config(config)?;
    let bold = Style::new().bold();
    let dim = Style::new().dim();

    match loaded.source {
        Some(ref path) => println!("{}", dim.apply_to(format!("Registry from {}", path.display()))),
        None => println!("{}", dim.apply_to("Built-in registry")),
    }
    for (idx, unit) in loaded.registry.units().iter().enumerate() {
        println!(
            "{:>2}. {} {} seq {}  {}",
            idx + 1,
            bold.apply_to(&unit.name),
            unit.version,
            unit.sequence,
            dim.apply_to(&unit.path)
        );
        println!("      policy: {}", unit.policy);
        println!("      tests:  {}", unit.tests.len());
    }
    Ok(())
}
