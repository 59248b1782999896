//! reconcile: snapshot reconciliation CLI.
//!
//! # Usage
//!
//! ```text
//! reconcile run [--config <path>] [--source-dir <dir> | --api-url <url>] [--out <dir>]
//!               [--delimiter <c>] [--on-error skip|halt] [--timeout-secs <n>] [--show-diff]
//! reconcile scan <dir>...
//! reconcile diff <old.json> <new.json>
//! reconcile normalize <file> [--config <path>]
//! ```
//!
//! `run` reads request lines from stdin. Exit status: 0 success, 1 malformed
//! input, 2 usage or configuration error, 3 snapshot collision, 4 halted on a
//! failed request, 5 completed with skipped requests, 6 stdin unreadable.
//! `normalize` exits 7 when the document cannot be loaded or normalized.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;

use commands::{diff::DiffArgs, normalize::NormalizeArgs, run::RunArgs, scan::ScanArgs};
use reconcile_sync::ingest::exit_code;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "reconcile",
    version,
    about = "Reconcile remote records with local changes into write-once snapshots",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Process `<id>:<stamp>:<path>` request lines from stdin.
    Run(RunArgs),

    /// Recover request lines from directories of audit snapshots.
    Scan(ScanArgs),

    /// Show a unified diff between two snapshot files.
    Diff(DiffArgs),

    /// Print a local change document after normalization.
    Normalize(NormalizeArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let result: Result<i32> = match cli.command {
        Commands::Run(args) => args.run(),
        Commands::Scan(args) => args.run(),
        Commands::Diff(args) => args.run(),
        Commands::Normalize(args) => args.run(),
    };
    let code = match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            exit_code::USAGE
        }
    };
    std::process::exit(code);
}

/// Diagnostics go to stderr so stdout carries only progress and results.
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
