pub mod diff;
pub mod normalize;
pub mod run;
pub mod scan;

use std::path::Path;

use anyhow::{Context, Result};

use reconcile_core::config::{self, Config};

/// Load `--config` when given, else the default file (or built-in defaults).
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_at(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => {
            let config = Config::load().context("failed to load default config")?;
            if let Some(path) = config::default_path() {
                tracing::debug!("configuration from {} (or defaults)", path.display());
            }
            Ok(config)
        }
    }
}
