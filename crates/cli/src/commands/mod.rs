//! Subcommand implementations.

pub mod chat;
pub mod check;
pub mod info;
pub mod init;
pub mod models;
pub mod platforms;

use std::path::{Path, PathBuf};

use parley_config::AppConfig;

/// The config file in use: `--config`, else `~/.parley/config.toml`.
pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"))
}

/// Load and validate the configuration.
pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let path = config_path(explicit);
    AppConfig::load_from(&path).map_err(|e| format!("Failed to load config: {e}").into())
}
