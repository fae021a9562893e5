//! `repomirror sync`: mirror the requested paths into the destination.

use anyhow::Result;
use clap::Args;
use colored::{ColoredString, Colorize};

use repomirror_sync::{unified_diff, FileAction, FileReport, ProgressSink, SyncOutcome};

use super::MirrorArgs;

/// Arguments for `repomirror sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    #[command(flatten)]
    pub mirror: MirrorArgs,

    /// Report what would change without writing anything.
    #[arg(long)]
    pub dry_run: bool,

    /// With `--dry-run`, also print a unified diff per changed file.
    #[arg(long, requires = "dry_run")]
    pub diff: bool,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        let (request, synchronizer) = self.mirror.prepare(self.dry_run)?;
        let mut printer = ProgressPrinter { show_diff: self.diff };

        match synchronizer.run(&request, &mut printer) {
            Ok(outcome) => {
                print_summary(&outcome);
                Ok(())
            }
            Err(failure) => {
                print_summary(&failure.outcome);
                Err(failure.error.into())
            }
        }
    }
}

/// Prints one line per file to stdout.
pub struct ProgressPrinter {
    pub show_diff: bool,
}

impl ProgressSink for ProgressPrinter {
    fn file(&mut self, report: &FileReport<'_>) {
        println!("{}: {}", colored_label(report.action), report.path);
        if self.show_diff && report.action.is_change() {
            print_diff(report);
        }
    }
}

fn colored_label(action: FileAction) -> ColoredString {
    let label = action.label();
    match action {
        FileAction::Unchanged => label.dimmed(),
        FileAction::Created | FileAction::ScheduledCreate => label.green(),
        FileAction::Updated | FileAction::ScheduledUpdate => label.yellow(),
        FileAction::WouldCreate | FileAction::WouldUpdate => label.cyan(),
    }
}

pub(crate) fn print_diff(report: &FileReport<'_>) {
    let diff = unified_diff(report.path, report.previous, report.planned);
    print!("{diff}");
    if !diff.ends_with('\n') {
        println!();
    }
}

fn print_summary(outcome: &SyncOutcome) {
    println!(
        "Done. Created: {}, Updated: {}, Unchanged: {}.",
        outcome.created, outcome.updated, outcome.skipped
    );
}
