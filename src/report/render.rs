//! Human-readable run summary

use std::fmt::Write as _;

use console::Style;

use super::{RunReport, UnitReport};
use crate::domain::RunMode;
use crate::ui::state_style;

/// Render `report` as the console summary printed after a run
pub fn render(report: &RunReport) -> String {
    let bold = Style::new().bold();
    let dim = Style::new().dim();
    let mut out = String::new();

    let _ = writeln!(out);
    let _ = writeln!(out, "{}", bold.apply_to(format!("{} summary", title(report.mode))));
    for unit in &report.units {
        render_unit(&mut out, report.mode, unit);
    }

    let _ = writeln!(out);
    let counters = report.counters;
    let _ = write!(
        out,
        "{} deployed, {} failed, {} skipped",
        counters.deployed, counters.failed, counters.skipped
    );
    if report.mode == RunMode::Test {
        let _ = write!(
            out,
            ", {} tested, {} test failed, assertions {}/{}",
            counters.tested, counters.test_failed, report.assertions_passed, report.assertions_total
        );
    }
    let _ = writeln!(out);
    let not_attempted = report.total - report.attempted;
    if not_attempted > 0 {
        let _ = writeln!(
            out,
            "{}",
            dim.apply_to(format!("{not_attempted} of {} units not attempted", report.total))
        );
    }

    if let Some(ref fatal) = report.fatal {
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "{} {}",
            Style::new().red().bold().apply_to("Aborted:"),
            fatal.message
        );
        if let Some(ref hint) = fatal.remediation {
            let _ = writeln!(out, "  {} {}", Style::new().cyan().apply_to("help:"), hint);
        }
    }
    if let Some(ref path) = report.log_path {
        let _ = writeln!(out, "{}", dim.apply_to(format!("Run log: {path}")));
    }
    out
}

fn title(mode: RunMode) -> &'static str {
    match mode {
        RunMode::Deploy => "Deployment",
        RunMode::Test => "Test",
    }
}

fn render_unit(out: &mut String, mode: RunMode, unit: &UnitReport) {
    let state = state_style(unit.state).apply_to(format!("{:<11}", unit.state));
    let mut line = format!("  {state} {} {} seq {}", unit.name, unit.version, unit.sequence);
    if mode == RunMode::Test && !unit.assertions.is_empty() {
        let _ = write!(line, "  {}/{}", unit.assertions_passed(), unit.assertions.len());
    }
    if let Some(ms) = unit.elapsed_ms {
        #[allow(clippy::cast_precision_loss)]
        let secs = ms as f64 / 1000.0;
        let _ = write!(line, "  ({secs:.1}s)");
    }
    let _ = writeln!(out, "{line}");

    for failed in unit.assertions.iter().filter(|a| !a.passed) {
        let _ = writeln!(
            out,
            "      {} {}: expected {}, {}",
            Style::new().red().apply_to("x"),
            failed.test,
            failed.condition,
            failed.detail.as_deref().unwrap_or("failed")
        );
    }
    if !unit.success {
        if let Some(ref error) = unit.error {
            let _ = writeln!(out, "      {error}");
        }
        if let Some(ref hint) = unit.remediation {
            let _ = writeln!(out, "      {} {}", Style::new().cyan().apply_to("help:"), hint);
        }
    }
    for warning in &unit.warnings {
        let _ = writeln!(out, "      {} {}", Style::new().yellow().apply_to("warning:"), warning);
    }
}
