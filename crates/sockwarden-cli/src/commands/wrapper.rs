use anyhow::{Context, Result};
use directories::BaseDirs;

use shadow_bin::aliases::{self, AliasChange};

#[derive(Debug, Clone, Copy)]
pub enum WrapperAction {
    Enable,
    Disable,
}

/// Rc file edits are best effort: failures are reported, never fatal.
pub fn execute(action: WrapperAction) -> Result<i32> {
    let dirs = BaseDirs::new().context("unable to determine home directory")?;
    let home = dirs.home_dir();
    let changes = match action {
        WrapperAction::Enable => {
            let exe = std::env::current_exe().context("locate the sockwarden executable")?;
            aliases::enable(home, &exe)
        }
        WrapperAction::Disable => aliases::disable(home),
    };
    if changes.is_empty() {
        println!("No shell rc files found in {}", home.display());
    }
    for line in summarize(action, &changes) {
        println!("{line}");
    }
    Ok(0)
}

fn summarize(action: WrapperAction, changes: &[AliasChange]) -> Vec<String> {
    changes
        .iter()
        .map(|change| {
            let file = change.rc_file.display();
            match (&change.result, action) {
                (Ok(true), WrapperAction::Enable) => format!("Added npm/npx aliases to {file}"),
                (Ok(true), WrapperAction::Disable) => {
                    format!("Removed npm/npx aliases from {file}")
                }
                (Ok(false), _) => format!("{file} already up to date"),
                (Err(err), _) => {
                    tracing::warn!("could not update {file}: {err:#}");
                    format!("Skipped {file}: {err:#}")
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn summarizes_each_rc_file() {
        let changes = vec![
            AliasChange {
                rc_file: PathBuf::from("/home/u/.bashrc"),
                result: Ok(true),
            },
            AliasChange {
                rc_file: PathBuf::from("/home/u/.zshrc"),
                result: Err(anyhow::anyhow!("permission denied")),
            },
        ];
        let lines = summarize(WrapperAction::Enable, &changes);
        assert_eq!(lines[0], "Added npm/npx aliases to /home/u/.bashrc");
        assert!(lines[1].starts_with("Skipped /home/u/.zshrc"));
    }
}
