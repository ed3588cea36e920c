//! UI/Progress presentation layer
//!
//! This module handles:
//! - Progress reporting while units move through a run
//! - Interactive progress bars using indicatif
//! - Silent progress for `--quiet` and non-terminal output
//!
//! All progress reporting goes through the ProgressReporter trait, so the
//! drivers never know whether a terminal is attached.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::domain::UnitState;

/// Progress reporter trait for a run
pub trait ProgressReporter {
    /// A unit's cycle begins
    fn start_unit(&mut self, unit: &str, current: usize, total: usize);

    /// The current unit entered a new phase (deploying, stabilizing, testing)
    fn phase(&mut self, message: &str);

    /// The current unit reached its final state
    fn finish_unit(&mut self, unit: &str, state: UnitState);

    /// Hide the bar while `f` talks to the terminal
    fn suspend(&mut self, f: &mut dyn FnMut()) {
        f();
    }

    /// Finish after the last unit
    fn finish(&mut self);

    /// Abandon on a fatal abort
    fn abandon(&mut self);
}

/// Style for a final unit state
pub fn state_style(state: UnitState) -> Style {
    match state {
        UnitState::Deployed | UnitState::Tested => Style::new().green(),
        UnitState::Skipped => Style::new().yellow(),
        UnitState::Failed | UnitState::TestFailed => Style::new().red().bold(),
        UnitState::Pending | UnitState::Deploying | UnitState::Testing => Style::new().dim(),
    }
}

/// Interactive progress reporter with a visual progress bar
pub struct InteractiveProgressReporter {
    unit_pb: ProgressBar,
    current: String,
}

impl InteractiveProgressReporter {
    /// Create a new interactive progress reporter with total unit count
    pub fn new(total_units: u64) -> Self {
        let style = ProgressStyle::default_bar()
            .template("[{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .map_or_else(|_| ProgressStyle::default_bar(), |s| s.progress_chars("#>-"));

        let unit_pb = ProgressBar::new(total_units);
        unit_pb.set_style(style);

        Self {
            unit_pb,
            current: String::new(),
        }
    }
}

impl ProgressReporter for InteractiveProgressReporter {
    fn start_unit(&mut self, unit: &str, current: usize, total: usize) {
        self.current = format!("({current}/{total}) {unit}");
        self.unit_pb.set_message(self.current.clone());
    }

    fn phase(&mut self, message: &str) {
        self.unit_pb
            .set_message(format!("{}: {}", self.current, message));
    }

    fn finish_unit(&mut self, unit: &str, state: UnitState) {
        self.unit_pb.println(format!(
            "  {} {}",
            state_style(state).apply_to(format!("{state:<11}")),
            unit
        ));
        self.unit_pb.inc(1);
    }

    fn suspend(&mut self, f: &mut dyn FnMut()) {
        self.unit_pb.suspend(f);
    }

    fn finish(&mut self) {
        self.unit_pb.finish_and_clear();
    }

    fn abandon(&mut self) {
        self.unit_pb.abandon();
    }
}

/// Silent progress reporter
///
/// No-op implementation used with `--quiet` or when stderr is not a terminal.
#[derive(Default)]
pub struct SilentProgressReporter;

impl ProgressReporter for SilentProgressReporter {
    fn start_unit(&mut self, _unit: &str, _current: usize, _total: usize) {
        // No-op for silent mode
    }

    fn phase(&mut self, _message: &str) {
        // No-op for silent mode
    }

    fn finish_unit(&mut self, _unit: &str, _state: UnitState) {
        // No-op for silent mode
    }

    fn finish(&mut self) {
        // No-op for silent mode
    }

    fn abandon(&mut self) {
        // No-op for silent mode
    }
}
