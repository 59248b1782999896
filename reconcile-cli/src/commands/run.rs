//! `reconcile run`: drive the ingestion loop from stdin.

use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use reconcile_core::config::{Config, HttpSourceConfig};
use reconcile_core::ErrorPolicy;
use reconcile_sync::{AnySource, ApiTranslator, Ingestor, RunReport, Termination};

use super::load_config;

/// Arguments for `reconcile run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Configuration file (default: `<config_dir>/reconcile/config.yaml`).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Read remote records from `<dir>/<id>.json` instead of the API.
    #[arg(long, conflicts_with = "api_url")]
    pub source_dir: Option<PathBuf>,

    /// Base URL of the records API.
    #[arg(long)]
    pub api_url: Option<String>,

    /// Directory snapshots are written to.
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Field separator for request lines.
    #[arg(long)]
    pub delimiter: Option<char>,

    /// What to do after a failed request: skip or halt.
    #[arg(long)]
    pub on_error: Option<ErrorPolicyArg>,

    /// Remote fetch timeout in seconds (0 waits forever).
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Print a unified diff for every changed record.
    #[arg(long)]
    pub show_diff: bool,
}

/// Thin wrapper so clap can parse [`ErrorPolicy`] from CLI args.
#[derive(Debug, Clone, Copy)]
pub struct ErrorPolicyArg(pub ErrorPolicy);

impl FromStr for ErrorPolicyArg {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "skip" => Ok(Self(ErrorPolicy::Skip)),
            "halt" => Ok(Self(ErrorPolicy::Halt)),
            other => Err(format!("unknown error policy '{other}'; expected: skip, halt")),
        }
    }
}

impl fmt::Display for ErrorPolicyArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl RunArgs {
    pub fn run(self) -> Result<i32> {
        let config = self.resolve_config()?;
        let source = AnySource::from_config(&config.source).context("invalid record source")?;
        let translator = ApiTranslator::from_config(&config.wire);
        let mut ingestor =
            Ingestor::from_config(source, translator, &config).with_show_diff(self.show_diff);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("failed to start tokio runtime")?;

        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        let mut stdout = std::io::stdout().lock();
        let report = runtime.block_on(ingestor.run(stdin, &mut stdout));
        if let Err(e) = stdout.flush() {
            tracing::warn!("stdout flush failed: {e}");
        }

        print_summary(&report, config.input.delimiter);
        Ok(report.exit_code())
    }

    /// Config file first, then flags on top.
    fn resolve_config(&self) -> Result<Config> {
        let mut config = load_config(self.config.as_deref())?;

        if let Some(dir) = &self.source_dir {
            config.source.directory = Some(dir.clone());
            config.source.http = None;
        }
        if let Some(url) = &self.api_url {
            let http = match config.source.http.take() {
                Some(existing) => HttpSourceConfig {
                    base_url: url.clone(),
                    ..existing
                },
                None => HttpSourceConfig::new(url.clone()),
            };
            config.source.http = Some(http);
            config.source.directory = None;
        }
        if let Some(out) = &self.out {
            config.output.dir = out.clone();
        }
        if let Some(delimiter) = self.delimiter {
            config.input.delimiter = delimiter;
        }
        if let Some(policy) = self.on_error {
            config.on_error = policy.0;
        }
        if let Some(secs) = self.timeout_secs {
            config.source.timeout_secs = secs;
        }

        config.validate().context("invalid configuration")?;
        tracing::debug!(
            "snapshots to {}, on_error={}",
            config.output.dir.display(),
            config.on_error
        );
        Ok(config)
    }
}

fn print_summary(report: &RunReport, delimiter: char) {
    let status = match &report.termination {
        Termination::Completed => "✓".green().bold(),
        Termination::CompletedWithFailures { .. } => "!".yellow().bold(),
        _ => "✗".red().bold(),
    };
    eprintln!(
        "{status} {} ({} line(s): {} updated, {} no-op, {} failed; {} fetched, {} cache hits)",
        report.termination,
        report.lines,
        report.updated,
        report.unchanged,
        report.failures.len(),
        report.cache.fetches,
        report.cache.hits,
    );

    if report.failures.is_empty() {
        return;
    }
    eprintln!("{}", "Failed requests:".yellow());
    for failure in &report.failures {
        eprintln!("{}", failure.request.to_line(delimiter));
    }
}
