//! `reconcile scan <dir>...`: turn an audit trail into request lines.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use reconcile_sync::audit;
use reconcile_sync::ingest::exit_code;

/// Arguments for `reconcile scan`.
#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Directories holding `LatS_*.json` audit files.
    #[arg(required = true)]
    pub dirs: Vec<PathBuf>,
}

impl ScanArgs {
    pub fn run(self) -> Result<i32> {
        let index = match audit::scan(self.dirs.as_slice()) {
            Ok(index) => index,
            Err(err) => {
                eprintln!("{} {err}", "audit trail invalid:".red().bold());
                return Ok(exit_code::MALFORMED_INPUT);
            }
        };

        for line in index.sync_sends() {
            println!("{line}");
        }

        eprintln!(
            "{} {} pid(s), {} stamp(s), {} with multiple sequences",
            "✓".green().bold(),
            index.pid_count(),
            index.stamps,
            index.multi_sequence_stamps
        );
        for path in &index.multi_sequence_paths {
            eprintln!("  ·  {}", path.display());
        }
        Ok(exit_code::OK)
    }
}
