//! Shim scripts that route `npm`/`npx` through the wrapper.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub const SHIMMED_BINS: [&str; 2] = ["npm", "npx"];

pub fn shim_script(exe: &Path, bin_name: &str) -> String {
    format!(
        "#!/bin/sh\n# generated by sockwarden\nexec {} {} \"$@\"\n",
        shell_quote(&exe.to_string_lossy()),
        bin_name
    )
}

/// Writes one executable shim per shadowed binary.
pub fn write_shims(shim_dir: &Path, exe: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(shim_dir)
        .with_context(|| format!("create shim dir {}", shim_dir.display()))?;
    let mut written = Vec::new();
    for bin_name in SHIMMED_BINS {
        let path = shim_dir.join(bin_name);
        fs::write(&path, shim_script(exe, bin_name))
            .with_context(|| format!("write shim {}", path.display()))?;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
            .with_context(|| format!("set shim permissions {}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}

pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
