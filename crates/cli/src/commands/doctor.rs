//! `kestrel doctor` Diagnose configuration and provider health.

use kestrel_config::AppConfig;
use kestrel_providers::build_client;
use std::path::Path;

use super::load_config;

pub async fn run(path: Option<&Path>) -> anyhow::Result<()> {
    println!("Kestrel doctor");
    println!("==============\n");

    let mut issues = 0;

    let config_path = path.map(Path::to_path_buf).unwrap_or_else(AppConfig::config_path);
    if config_path.exists() {
        println!("  [ok]   Config file: {}", config_path.display());
    } else {
        println!("  [warn] No config file at {} (defaults in use)", config_path.display());
    }

    let config = match load_config(path) {
        Ok(config) => {
            println!("  [ok]   Configuration valid");
            config
        }
        Err(e) => {
            println!("  [fail] {e:#}");
            println!("\n  1 issue found.");
            return Ok(());
        }
    };

    println!(
        "         Provider {} / model {}",
        config.provider.name, config.provider.model
    );
    if config.has_api_key() {
        println!("  [ok]   API key configured");
    } else {
        println!("  [warn] No API key configured");
        issues += 1;
    }

    match build_client(&config.provider) {
        Ok(client) => {
            if client.is_healthy().await {
                println!("  [ok]   Provider reachable");
            } else {
                println!("  [fail] Cannot reach {}", client.provider_name());
                issues += 1;
            }
        }
        Err(e) => {
            println!("  [fail] {e}");
            issues += 1;
        }
    }

    let permissions = AppConfig::permissions_path();
    if permissions.exists() {
        println!("  [ok]   Permission policies: {}", permissions.display());
    }

    println!();
    if issues == 0 {
        println!("  All checks passed.");
    } else {
        println!("  {issues} issue(s) found.");
    }
    Ok(())
}
