use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use sockwarden_core::error::SockwardenError;

/// The npm package directory a real `npm`/`npx` binary belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NpmRoot {
    pub path: PathBuf,
    pub version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PackageManifest {
    name: Option<String>,
    version: Option<String>,
}

/// Follows the binary's symlinks up to a directory named `npm` holding npm's
/// own `package.json`, falling back to `<prefix>/lib/node_modules/npm`.
pub fn npm_install_root(real_bin: &Path) -> Result<NpmRoot, SockwardenError> {
    let resolved = fs::canonicalize(real_bin).unwrap_or_else(|_| real_bin.to_path_buf());

    let from_ancestors = resolved
        .ancestors()
        .skip(1)
        .find(|dir| dir.file_name().is_some_and(|name| name == "npm") && is_npm_package(dir));
    let from_prefix = || {
        real_bin
            .parent()
            .and_then(Path::parent)
            .map(|prefix| prefix.join("lib").join("node_modules").join("npm"))
            .filter(|dir| is_npm_package(dir))
    };

    let root = from_ancestors
        .map(Path::to_path_buf)
        .or_else(from_prefix)
        .ok_or_else(|| SockwardenError::NpmRootNotFound(real_bin.display().to_string()))?;
    let version = read_manifest(&root).and_then(|manifest| manifest.version);
    Ok(NpmRoot {
        path: root,
        version,
    })
}

fn is_npm_package(dir: &Path) -> bool {
    read_manifest(dir)
        .and_then(|manifest| manifest.name)
        .map(|name| name == "npm")
        .unwrap_or(false)
}

fn read_manifest(dir: &Path) -> Option<PackageManifest> {
    let contents = fs::read_to_string(dir.join("package.json")).ok()?;
    serde_json::from_str(&contents).ok()
}
