//! Deploy command implementation

use std::path::Path;

use super::helpers;
use crate::cli::RunArgs;
use crate::error::Result;
use crate::orchestrator::Driver;

/// Deploy every registry unit in order; returns the process exit code
pub fn run(config: Option<&Path>, quiet: bool, args: &RunArgs) -> Result<i32> {
    let loaded = helpers::load_config(config)?;
    helpers::execute(loaded, args, quiet, Driver::Deploy)
}
