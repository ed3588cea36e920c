//! Blocking pauses on the control thread
//!
//! Every wait in a run is an explicit, bounded pause on the single control
//! thread. Tests swap in a recorder so no real time passes.

use std::fmt;
use std::thread;
use std::time::Duration;

/// Why the control thread is pausing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseKind {
    /// After a successful deploy, before declaring it deployed
    Stabilization,
    /// Between two test cycles
    Recovery,
    /// Between two monitor samples
    Interval,
}

impl fmt::Display for PauseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PauseKind::Stabilization => f.write_str("stabilization"),
            PauseKind::Recovery => f.write_str("recovery"),
            PauseKind::Interval => f.write_str("interval"),
        }
    }
}

pub trait Pause {
    fn pause(&mut self, kind: PauseKind, duration: Duration);
}

/// Sleeps the current thread
#[derive(Debug, Default)]
pub struct ThreadPause;

impl Pause for ThreadPause {
    fn pause(&mut self, kind: PauseKind, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        tracing::debug!(%kind, secs = duration.as_secs_f64(), "pausing");
        thread::sleep(duration);
    }
}
