use std::path::PathBuf;

use anyhow::Result;

use sockwarden_core::ExitOutcome;

use crate::tree::DiffTree;

/// What kind of mutation the wrapped command performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// install, update, uninstall, dedupe and friends.
    Install,
    /// `npm ci`: the committed lockfile is the target tree.
    CleanInstall,
    /// `npx` / `npm exec`: packages land in a throwaway cache.
    Exec,
}

#[derive(Debug, Clone)]
pub struct ReifyOptions {
    pub operation: Operation,
    /// Arguments for the real binary, subcommand included.
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub global: bool,
    pub dry_run: bool,
    pub save: bool,
    pub save_bundle: bool,
}

impl ReifyOptions {
    pub fn new(operation: Operation, args: Vec<String>, cwd: PathBuf) -> Self {
        let flag = |name: &str| args.iter().any(|arg| arg == name);
        let global = flag("-g") || flag("--global") || flag("--location=global");
        let dry_run = flag("--dry-run");
        let save = !(flag("--no-save") || flag("--save=false"));
        Self {
            operation,
            args,
            cwd,
            global,
            dry_run,
            save,
            save_bundle: false,
        }
    }

    /// A side-effect-free copy: dry run, nothing written back to manifests.
    pub fn as_dry_run(&self) -> Self {
        Self {
            dry_run: true,
            save: false,
            save_bundle: false,
            ..self.clone()
        }
    }
}

#[derive(Debug)]
pub enum Reified {
    /// A dry run: what would change.
    Diff(DiffTree),
    /// A real run: how the package manager finished.
    Applied(ExitOutcome),
}

/// The package manager's own resolution engine. An instance may not be
/// reused once it has reified anything, dry run included.
pub trait Resolver: Send {
    fn reify(&mut self, options: &ReifyOptions) -> Result<Reified>;
}

pub trait ResolverFactory: Send + Sync {
    fn create(&self) -> Box<dyn Resolver>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_flags() {
        let options = ReifyOptions::new(
            Operation::Install,
            vec!["install".into(), "-g".into(), "--dry-run".into(), "--no-save".into()],
            PathBuf::from("/work"),
        );
        assert!(options.global);
        assert!(options.dry_run);
        assert!(!options.save);
    }

    #[test]
    fn dry_run_copy_disables_saving() {
        let options =
            ReifyOptions::new(Operation::Install, vec!["install".into()], PathBuf::from("/work"));
        assert!(options.save);
        let dry = options.as_dry_run();
        assert!(dry.dry_run && !dry.save && !dry.save_bundle);
        assert!(!options.dry_run);
    }
}
