use clap::Parser;

use crate::scheduler::ReplaceChoice;

/// Arguments for the deploy and test commands
#[derive(Parser, Debug, Clone, Default)]
#[command(after_help = "EXAMPLES:\n  \
                  Ask before replacing a live unit (terminal only):\n    chainroll deploy\n\n\
                  Always redeploy live units:\n    chainroll deploy --replace\n\n\
                  Never touch live units (CI):\n    chainroll test --skip-existing")]
pub struct RunArgs {
    /// Remove and redeploy units that are already live
    #[arg(long, conflicts_with = "skip_existing")]
    pub replace: bool,

    /// Leave units that are already live untouched
    #[arg(long)]
    pub skip_existing: bool,
}

impl RunArgs {
    /// The choice forced by flags; `None` means ask (or skip without a terminal)
    pub fn forced_choice(&self) -> Option<ReplaceChoice> {
        if self.replace {
            Some(ReplaceChoice::Replace)
        } else if self.skip_existing {
            Some(ReplaceChoice::Skip)
        } else {
            None
        }
    }
}
