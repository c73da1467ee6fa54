pub mod chat;
pub mod config_cmd;
pub mod doctor;

use anyhow::Context;
use kestrel_config::AppConfig;
use std::path::Path;

/// Load from `path` when given, otherwise from the default location.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    match path {
        Some(path) => AppConfig::load_at(path),
        None => AppConfig::load(),
    }
    .context("Failed to load config")
}
