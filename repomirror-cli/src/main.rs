//! repomirror: mirror files and directories from a GitHub repository.
//!
//! # Usage
//!
//! ```text
//! repomirror sync --repo <owner/name> --dest <dir> --path <p> [--path <p> ...]
//!                 [--branch <ref>] [--token <t>] [--wait-on-rate-limit]
//!                 [--dry-run [--diff]] [--config <file>]
//! repomirror diff --repo <owner/name> --dest <dir> --path <p> ...
//! ```
//!
//! Exit status is 0 on success and 2 on any fatal error.

mod commands;

use std::process::ExitCode;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;

use commands::{diff::DiffArgs, sync::SyncArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "repomirror",
    version,
    about = "Mirror files and directories from a GitHub repository",
    long_about = None,
)]
struct Cli {
    /// Log remote requests and per-file decisions to stderr.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Bring the destination in line with the remote paths.
    Sync(SyncArgs),

    /// Show a unified diff of what sync would change. Writes nothing.
    Diff(DiffArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            ExitCode::from(2)
        }
    }
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Sync(args) => args.run(),
        Commands::Diff(args) => args.run(),
    }
}

/// `RUST_LOG` wins; otherwise `warn`, or `debug` with `-v`.
fn init_tracing(verbose: u8) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose > 0 { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
