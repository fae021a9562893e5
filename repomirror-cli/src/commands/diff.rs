//! `repomirror diff`: show unified diffs for what sync would write.

use anyhow::Result;
use clap::Args;

use repomirror_sync::{FileReport, SyncOutcome};

use super::sync::print_diff;
use super::MirrorArgs;

/// Arguments for `repomirror diff`.
#[derive(Args, Debug)]
pub struct DiffArgs {
    #[command(flatten)]
    pub mirror: MirrorArgs,
}

impl DiffArgs {
    pub fn run(self) -> Result<()> {
        let (request, synchronizer) = self.mirror.prepare(true)?;

        let mut print_changes = |report: &FileReport<'_>| {
            if report.action.is_change() {
                print_diff(report);
            }
        };
        let outcome: SyncOutcome = synchronizer
            .run(&request, &mut print_changes)
            .map_err(|failure| failure.error)?;

        if outcome.created + outcome.updated == 0 {
            println!("No differences.");
        }
        Ok(())
    }
}
