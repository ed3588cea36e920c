use clap::Parser;
use std::path::PathBuf;

/// Arguments for the monitor command
#[derive(Parser, Debug, Clone)]
#[command(after_help = "EXAMPLES:\n  \
                  Sample every 5 seconds until interrupted:\n    chainroll monitor\n\n\
                  Take 12 samples into a file:\n    chainroll monitor --count 12 --output logs/resources.jsonl")]
pub struct MonitorArgs {
    /// Seconds between samples
    #[arg(long, short = 'i', default_value_t = 5)]
    pub interval: u64,

    /// Stop after this many samples
    #[arg(long, short = 'n')]
    pub count: Option<u64>,

    /// JSON-lines file to append samples to (defaults to <logs.dir>/resources-<timestamp>.jsonl)
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}
