//! Monitor command implementation

use std::path::Path;
use std::time::Duration;

use chrono::Local;

use super::helpers;
use crate::cli::MonitorArgs;
use crate::error::Result;
use crate::pause::ThreadPause;
use crate::report::log::RunLog;
use crate::resource::ResourceMonitor;

/// Sample host resources on an interval into a JSON-lines file
pub fn run(config: Option<&Path>, args: &MonitorArgs) -> Result<()> {
    let loaded = helpers::load_config(config)?;
    let config = &loaded.config;

    let mut log = match args.output {
        Some(ref path) => RunLog::append_to(path)?,
        None => RunLog::create(&config.logs.dir, "resources")?,
    };
    if let Some(path) = log.path() {
        println!("Logging resource samples to {}", path.display());
    }

    let tracked = loaded
        .registry
        .units()
        .iter()
        .map(|u| u.name.clone())
        .collect();
    let mut monitor = ResourceMonitor::new(
        Box::new(helpers::host_probe(config)),
        config.resources.clone(),
        tracked,
        Duration::from_secs(args.interval),
    );

    let taken = monitor.run(args.count, &mut log, &mut ThreadPause, |line| {
        println!("{} {line}", Local::now().format("%H:%M:%S"));
    });
    tracing::info!(samples = taken, "monitor stopped");
    Ok(())
}
