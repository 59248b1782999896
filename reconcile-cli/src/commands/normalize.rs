//! `reconcile normalize <file>`: show what a local document normalizes to.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use reconcile_core::record::canonical_pretty;
use reconcile_sync::ingest::exit_code;
use reconcile_sync::Reconciler;

use super::load_config;

/// Arguments for `reconcile normalize`.
#[derive(Args, Debug)]
pub struct NormalizeArgs {
    /// Local change document (`{"name": ..., "service": ...}`).
    pub file: PathBuf,

    /// Configuration file supplying the schemas.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl NormalizeArgs {
    pub fn run(self) -> Result<i32> {
        let config = load_config(self.config.as_deref())?;
        let reconciler = Reconciler::from_config(&config.schemas);

        match reconciler.load_local(&self.file) {
            Ok(local) => {
                println!("{}", canonical_pretty(&local.to_document()));
                Ok(exit_code::OK)
            }
            Err(err) => {
                eprintln!("{} {err}", "✗".red().bold());
                Ok(exit_code::INVALID_DOCUMENT)
            }
        }
    }
}
