use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Once;

static PREPARED: Once = Once::new();

/// Puts `shim_dir` first on this process's PATH so every child (lifecycle
/// scripts, nested `npm exec`) shadows too. Runs once and is never reverted.
pub fn prepare_environment(shim_dir: &Path) {
    PREPARED.call_once(|| {
        if let Some(path) = path_with_shim_first(shim_dir, std::env::var_os("PATH")) {
            tracing::debug!(shim_dir = %shim_dir.display(), "prepending shim dir to PATH");
            std::env::set_var("PATH", path);
        }
    });
}

/// New PATH value with `shim_dir` in front, or `None` if it already leads.
pub fn path_with_shim_first(shim_dir: &Path, current: Option<OsString>) -> Option<OsString> {
    let entries: Vec<PathBuf> = current
        .as_ref()
        .map(|value| std::env::split_paths(value).collect())
        .unwrap_or_default();
    if let Some(first) = entries.first() {
        if same_dir(first, shim_dir) {
            return None;
        }
    }
    let joined = std::iter::once(shim_dir.to_path_buf()).chain(entries);
    std::env::join_paths(joined).ok()
}

fn same_dir(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepends_when_not_first() {
        let current = std::env::join_paths(["/usr/bin", "/bin"]).unwrap();
        let updated = path_with_shim_first(Path::new("/opt/shims"), Some(current)).unwrap();
        let entries: Vec<PathBuf> = std::env::split_paths(&updated).collect();
        assert_eq!(entries[0], PathBuf::from("/opt/shims"));
        assert_eq!(entries.len(), 3);
    }

    #[test]
    fn leaves_path_alone_when_already_first() {
        let current = std::env::join_paths(["/opt/shims", "/usr/bin"]).unwrap();
        assert!(path_with_shim_first(Path::new("/opt/shims"), Some(current)).is_none());
    }

    #[test]
    fn handles_missing_path() {
        let updated = path_with_shim_first(Path::new("/opt/shims"), None).unwrap();
        assert_eq!(updated, OsString::from("/opt/shims"));
    }
}
