use std::path::PathBuf;

use anyhow::{Context, Result};

use shadow_bin::shims::write_shims;
use sockwarden_core::config::{Config, ConfigPaths};

pub fn install(config_path: Option<PathBuf>) -> Result<i32> {
    let paths = ConfigPaths::resolve()?;
    let config = Config::load_or_default(config_path.as_deref(), &paths)?;
    let shim_dir = config.shim_dir(&paths);
    let exe = std::env::current_exe()
        .and_then(|exe| exe.canonicalize())
        .context("locate the sockwarden executable")?;

    for shim in write_shims(&shim_dir, &exe)? {
        println!("Wrote {}", shim.display());
    }
    println!(
        "Put {} first on PATH to route npm and npx through sockwarden.",
        shim_dir.display()
    );
    Ok(0)
}
