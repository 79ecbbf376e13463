//! Shell rc aliases for `npm`/`npx`. Best effort: callers report failures
//! and carry on.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::shims::{shell_quote, SHIMMED_BINS};

const MARKER: &str = "# sockwarden";
pub const RC_FILES: [&str; 2] = [".bashrc", ".zshrc"];

#[derive(Debug)]
pub struct AliasChange {
    pub rc_file: PathBuf,
    pub result: Result<bool>,
}

pub fn alias_lines(exe: &Path) -> Vec<String> {
    SHIMMED_BINS
        .iter()
        .map(|bin| {
            format!(
                "alias {bin}={} {MARKER}",
                shell_quote(&format!("{} {bin}", exe.display()))
            )
        })
        .collect()
}

/// Adds aliases to every existing rc file under `home`.
pub fn enable(home: &Path, exe: &Path) -> Vec<AliasChange> {
    existing_rc_files(home)
        .into_iter()
        .map(|rc_file| {
            let result = add_aliases(&rc_file, exe);
            AliasChange { rc_file, result }
        })
        .collect()
}

pub fn disable(home: &Path) -> Vec<AliasChange> {
    existing_rc_files(home)
        .into_iter()
        .map(|rc_file| {
            let result = remove_aliases(&rc_file);
            AliasChange { rc_file, result }
        })
        .collect()
}

fn existing_rc_files(home: &Path) -> Vec<PathBuf> {
    RC_FILES
        .iter()
        .map(|name| home.join(name))
        .filter(|path| path.is_file())
        .collect()
}

/// Returns whether the file changed.
fn add_aliases(rc_file: &Path, exe: &Path) -> Result<bool> {
    let contents = fs::read_to_string(rc_file)
        .with_context(|| format!("read {}", rc_file.display()))?;
    if contents.lines().any(|line| line.ends_with(MARKER)) {
        return Ok(false);
    }
    let mut updated = contents;
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    for line in alias_lines(exe) {
        updated.push_str(&line);
        updated.push('\n');
    }
    fs::write(rc_file, updated).with_context(|| format!("write {}", rc_file.display()))?;
    Ok(true)
}

fn remove_aliases(rc_file: &Path) -> Result<bool> {
    let contents = fs::read_to_string(rc_file)
        .with_context(|| format!("read {}", rc_file.display()))?;
    let kept: Vec<&str> = contents.lines().filter(|line| !line.ends_with(MARKER)).collect();
    if kept.len() == contents.lines().count() {
        return Ok(false);
    }
    let mut updated = kept.join("\n");
    if !updated.is_empty() {
        updated.push('\n');
    }
    fs::write(rc_file, updated).with_context(|| format!("write {}", rc_file.display()))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enable_is_idempotent_and_disable_restores() {
        let home = tempfile::tempdir().unwrap();
        let rc = home.path().join(".bashrc");
        fs::write(&rc, "export EDITOR=vim").unwrap();
        let exe = Path::new("/usr/local/bin/sockwarden");

        let changes = enable(home.path(), exe);
        assert_eq!(changes.len(), 1);
        assert!(*changes[0].result.as_ref().unwrap());
        let contents = fs::read_to_string(&rc).unwrap();
        assert!(contents.contains("alias npm='/usr/local/bin/sockwarden npm' # sockwarden"));
        assert!(contents.contains("alias npx='/usr/local/bin/sockwarden npx' # sockwarden"));

        let again = enable(home.path(), exe);
        assert!(!*again[0].result.as_ref().unwrap());

        let removed = disable(home.path());
        assert!(*removed[0].result.as_ref().unwrap());
        assert_eq!(fs::read_to_string(&rc).unwrap(), "export EDITOR=vim\n");
    }

    #[test]
    fn skips_missing_rc_files() {
        let home = tempfile::tempdir().unwrap();
        assert!(enable(home.path(), Path::new("/bin/sw")).is_empty());
    }
}
