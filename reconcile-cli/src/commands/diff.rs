//! `reconcile diff <old> <new>`: unified diff of two snapshots.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use reconcile_sync::diff::file_diff;
use reconcile_sync::ingest::exit_code;

/// Arguments for `reconcile diff`.
#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Earlier snapshot.
    pub old: PathBuf,

    /// Later snapshot.
    pub new: PathBuf,
}

impl DiffArgs {
    pub fn run(self) -> Result<i32> {
        let diff = file_diff(&self.old, &self.new).with_context(|| {
            format!(
                "diff failed for {} and {}",
                self.old.display(),
                self.new.display()
            )
        })?;

        if diff.is_empty() {
            println!(
                "No differences between {} and {}.",
                self.old.display(),
                self.new.display()
            );
            return Ok(exit_code::OK);
        }

        print!("{diff}");
        if !diff.ends_with('\n') {
            println!();
        }
        Ok(exit_code::OK)
    }
}
