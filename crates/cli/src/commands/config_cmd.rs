//! `kestrel config` Configuration management commands.

use anyhow::Context;
use kestrel_config::AppConfig;
use std::path::{Path, PathBuf};

use super::load_config;

fn resolve(path: Option<&Path>) -> PathBuf {
    path.map(Path::to_path_buf)
        .unwrap_or_else(AppConfig::config_path)
}

pub fn show(path: Option<&Path>) -> anyhow::Result<()> {
    let mut config = load_config(path)?;
    if config.provider.api_key.is_some() {
        config.provider.api_key = Some("[REDACTED]".into());
    }
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

pub fn path(path: Option<&Path>) {
    println!("{}", resolve(path).display());
}

pub fn init(path: Option<&Path>, force: bool) -> anyhow::Result<()> {
    let path = resolve(path);
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    std::fs::write(&path, AppConfig::default_toml())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}
