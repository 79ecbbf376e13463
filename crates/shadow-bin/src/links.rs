//! Finding the real package-manager binary behind our own shims.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use sockwarden_core::error::{SockwardenError, EXIT_NOT_FOUND};

use crate::env::prepare_environment;

/// Resolves the real `bin_name` and puts `shim_dir` first on PATH.
///
/// Exits the process with 127 when only the shim is found: continuing would
/// recurse into the wrapper.
pub fn install_links(shim_dir: &Path, bin_name: &str) -> PathBuf {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    match find_real_binary(bin_name, shim_dir, std::env::var_os("PATH"), &cwd) {
        Ok(real) => {
            tracing::debug!(bin = bin_name, real = %real.display(), "resolved real binary");
            prepare_environment(shim_dir);
            real
        }
        Err(err) => {
            eprintln!("sockwarden: {err}");
            std::process::exit(EXIT_NOT_FOUND);
        }
    }
}

/// Walks every `bin_name` on `path_var` and returns the first one that is not
/// one of our shims once symlinks are resolved.
pub fn find_real_binary(
    bin_name: &str,
    shim_dir: &Path,
    path_var: Option<OsString>,
    cwd: &Path,
) -> Result<PathBuf, SockwardenError> {
    let shim_real = fs::canonicalize(shim_dir).unwrap_or_else(|_| shim_dir.to_path_buf());
    let self_exe = std::env::current_exe()
        .ok()
        .and_then(|exe| fs::canonicalize(exe).ok());

    let candidates: Vec<PathBuf> = match path_var {
        Some(paths) => which::which_in_all(bin_name, Some(paths), cwd)
            .map(|found| found.collect())
            .unwrap_or_default(),
        None => Vec::new(),
    };

    for candidate in candidates {
        let real = fs::canonicalize(&candidate).unwrap_or_else(|_| candidate.clone());
        let in_shim_dir = real.starts_with(&shim_real) || candidate.parent() == Some(shim_dir);
        let is_self = self_exe.as_ref() == Some(&real);
        if in_shim_dir || is_self {
            tracing::debug!(candidate = %candidate.display(), "skipping shim candidate");
            continue;
        }
        return Ok(candidate);
    }
    Err(SockwardenError::BinaryNotFound(bin_name.to_string()))
}
