//! `ironloop init` — Write a default config file.

use ironloop_config::AppConfig;
use std::path::PathBuf;

pub async fn run(path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = path.unwrap_or_else(|| AppConfig::config_dir().join("config.toml"));

    if config_path.exists() {
        println!("Config already exists at: {}", config_path.display());
        println!("Edit it manually or delete it and re-run init.");
        return Ok(());
    }
    if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("Created config at: {}", config_path.display());
    println!("\nNext steps:");
    println!("  1. Set openai.api_key (or export IRONLOOP_OPENAI_KEY)");
    println!("  2. ironloop auto --goal \"...\"");
    Ok(())
}
