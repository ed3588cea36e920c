//! Replace-or-skip decisions for units that are already live

use inquire::Confirm;

use crate::domain::DeploymentUnit;

/// What to do with a unit that already has live instances
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceChoice {
    /// Remove the live instances, then deploy
    Replace,
    /// Leave the live instances alone and mark the unit `SKIPPED`
    Skip,
}

/// Decides replace-or-skip for an already live unit
pub trait ReplaceDecision {
    fn decide(&mut self, unit: &DeploymentUnit, instances: &[String]) -> ReplaceChoice;
}

/// Always skip; the default without a terminal
#[derive(Debug, Default)]
pub struct SkipExisting;

impl ReplaceDecision for SkipExisting {
    fn decide(&mut self, _unit: &DeploymentUnit, _instances: &[String]) -> ReplaceChoice {
        ReplaceChoice::Skip
    }
}

/// Always replace (`--replace`)
#[derive(Debug, Default)]
pub struct ReplaceExisting;

impl ReplaceDecision for ReplaceExisting {
    fn decide(&mut self, _unit: &DeploymentUnit, _instances: &[String]) -> ReplaceChoice {
        ReplaceChoice::Replace
    }
}

/// Ask on the terminal; any prompt error counts as skip
#[derive(Debug, Default)]
pub struct PromptDecision;

impl ReplaceDecision for PromptDecision {
    fn decide(&mut self, unit: &DeploymentUnit, instances: &[String]) -> ReplaceChoice {
        let message = format!(
            "Unit '{}' is already deployed ({} live instance{}). Replace it?",
            unit.name,
            instances.len(),
            if instances.len() == 1 { "" } else { "s" }
        );
        let answer = Confirm::new(&message)
            .with_default(false)
            .with_help_message("'y' removes the live instance and redeploys, Enter skips the unit")
            .prompt();

        match answer {
            Ok(true) => ReplaceChoice::Replace,
            Ok(false) => ReplaceChoice::Skip,
            Err(e) => {
                tracing::warn!(unit = %unit.name, error = %e, "replace prompt failed, skipping unit");
                ReplaceChoice::Skip
            }
        }
    }
}
