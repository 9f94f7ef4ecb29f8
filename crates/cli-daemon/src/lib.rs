//! Shared setup for the pipeline binaries.

use media_pipeline::config::{Config, ConfigError};
use std::path::{Path, PathBuf};

/// Install the tracing subscriber. `RUST_LOG` wins; the default level is
/// `info`. Logs go to stderr so stdout stays free for reports.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Load the config file (missing means defaults), then apply path flags.
pub fn load_config(
    path: &Path,
    storage_root: Option<PathBuf>,
    state_dir: Option<PathBuf>,
) -> Result<Config, ConfigError> {
    let mut config = Config::load_or_default(path)?;
    if let Some(root) = storage_root {
        config.storage.root = root;
    }
    if let Some(dir) = state_dir {
        config.storage.state_dir = dir;
    }
    Ok(config)
}
