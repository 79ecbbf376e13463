use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};

use sockwarden_core::config::{Config, ConfigPaths};

pub fn init(path: Option<PathBuf>, force: bool) -> Result<i32> {
    let config_path = match path {
        Some(path) => path,
        None => ConfigPaths::resolve()?.config_path,
    };
    write_default(&config_path, force)?;
    println!("Config written to {}", config_path.display());
    Ok(0)
}

fn write_default(config_path: &std::path::Path, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        return Err(anyhow!(
            "Config already exists at {} (use --force to overwrite)",
            config_path.display()
        ));
    }
    Config::default_config().save(config_path)
}

pub fn print_effective(config_path: Option<PathBuf>) -> Result<i32> {
    let paths = ConfigPaths::resolve()?;
    let config = Config::load_or_default(config_path.as_deref(), &paths)
        .context("load effective config")?;
    println!("{}", config.to_toml_string()?);
    Ok(0)
}
