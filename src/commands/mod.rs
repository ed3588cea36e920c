//! Command implementations for the chainroll CLI
//!
//! `deploy`, `test` and `check` return the process exit code; the rest exit
//! 0 unless they fail.

pub mod check;
pub mod completions;
pub mod deploy;
pub mod helpers;
pub mod monitor;
pub mod units;
pub mod version;
