//! `Resolver` backed by the real npm: diffs are computed in a scratch copy
//! of the project with `--package-lock-only`, so nothing on disk changes.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use serde_json::Value;

use shadow_bin::RealCommand;

use crate::lockfile::{diff_lockfiles, override_conflicts, Lockfile, PROJECT_LOCKFILES};
use crate::overrides::Overrides;
use crate::resolver::{Operation, Reified, ReifyOptions, Resolver, ResolverFactory};
use crate::tree::DiffTree;

/// Files npm needs to resolve a project the same way in a scratch copy.
const PROJECT_FILES: [&str; 2] = ["package.json", ".npmrc"];

const LOCK_ONLY_FLAGS: [&str; 5] = [
    "--package-lock-only",
    "--ignore-scripts",
    "--no-audit",
    "--no-fund",
    "--no-update-notifier",
];

/// Flags that take the following argument as their value.
const VALUE_FLAGS: [&str; 8] = [
    "--prefix",
    "--registry",
    "--tag",
    "--cache",
    "--userconfig",
    "--workspace",
    "-w",
    "--omit",
];

const SCRATCH_MANIFEST: &str = r#"{"name":"sockwarden-scratch","version":"0.0.0","private":true}"#;

pub struct NpmResolverFactory {
    npm: PathBuf,
    program: PathBuf,
}

impl NpmResolverFactory {
    /// `npm` computes diffs; `program` is what the user actually invoked
    /// (`npm` or `npx`) and performs the real run.
    pub fn new(npm: PathBuf, program: PathBuf) -> Self {
        Self { npm, program }
    }
}

impl ResolverFactory for NpmResolverFactory {
    fn create(&self) -> Box<dyn Resolver> {
        Box::new(NpmResolver {
            npm: self.npm.clone(),
            program: self.program.clone(),
            used: false,
        })
    }
}

pub struct NpmResolver {
    npm: PathBuf,
    program: PathBuf,
    used: bool,
}

impl Resolver for NpmResolver {
    fn reify(&mut self, options: &ReifyOptions) -> Result<Reified> {
        if self.used {
            bail!("npm resolver already reified; create a fresh one");
        }
        self.used = true;

        if options.dry_run {
            return Ok(Reified::Diff(self.compute_diff(options)?));
        }
        let outcome = RealCommand::new(self.program.clone(), options.args.clone())
            .current_dir(&options.cwd)
            .run()?;
        Ok(Reified::Applied(outcome))
    }
}

impl NpmResolver {
    fn compute_diff(&self, options: &ReifyOptions) -> Result<DiffTree> {
        let (actual, ideal, overrides) = match options.operation {
            Operation::Exec => {
                let ideal = self.resolve_specs(&exec_packages(&options.args, &options.cwd))?;
                (Lockfile::default(), ideal, Overrides::empty())
            }
            Operation::Install if options.global => {
                let ideal = self.resolve_specs(&install_specs(&options.args))?;
                (Lockfile::default(), ideal, Overrides::empty())
            }
            Operation::CleanInstall => {
                let ideal = Lockfile::read_project(&options.cwd)?.ok_or_else(|| {
                    anyhow!(
                        "npm ci needs a package-lock.json or npm-shrinkwrap.json in {}",
                        options.cwd.display()
                    )
                })?;
                let actual = Lockfile::read_installed(&options.cwd)?;
                (actual, ideal, read_overrides(&options.cwd))
            }
            Operation::Install => {
                let actual = Lockfile::read_installed(&options.cwd)?;
                let ideal = self.resolve_in_copy(options)?;
                (actual, ideal, read_overrides(&options.cwd))
            }
        };

        for name in override_conflicts(&ideal, &overrides) {
            tracing::info!(package = %name, "dependents disagree on overrides; none applied");
        }
        Ok(diff_lockfiles(&actual, &ideal))
    }

    /// Runs the user's own command lock-only in a copy of the project.
    fn resolve_in_copy(&self, options: &ReifyOptions) -> Result<Lockfile> {
        let scratch = tempfile::tempdir().context("create scratch project")?;
        for name in PROJECT_FILES.iter().chain(PROJECT_LOCKFILES.iter()) {
            let source = options.cwd.join(name);
            if source.is_file() {
                fs::copy(&source, scratch.path().join(name))
                    .with_context(|| format!("copy {} to scratch project", source.display()))?;
            }
        }
        let mut args: Vec<String> = options
            .args
            .iter()
            .filter(|arg| arg.as_str() != "--dry-run")
            .cloned()
            .collect();
        args.extend(LOCK_ONLY_FLAGS.iter().map(|flag| flag.to_string()));
        self.run_npm(scratch.path(), args)?;
        Ok(Lockfile::read_project(scratch.path())?.unwrap_or_default())
    }

    /// Resolves bare package specs in an empty project.
    fn resolve_specs(&self, specs: &[String]) -> Result<Lockfile> {
        if specs.is_empty() {
            return Ok(Lockfile::default());
        }
        let scratch = tempfile::tempdir().context("create scratch project")?;
        fs::write(scratch.path().join("package.json"), SCRATCH_MANIFEST)
            .context("write scratch manifest")?;
        let mut args = vec!["install".to_string()];
        args.extend(specs.iter().cloned());
        args.extend(LOCK_ONLY_FLAGS.iter().map(|flag| flag.to_string()));
        self.run_npm(scratch.path(), args)?;
        Ok(Lockfile::read_project(scratch.path())?.unwrap_or_default())
    }

    fn run_npm(&self, dir: &Path, args: Vec<String>) -> Result<()> {
        tracing::debug!(dir = %dir.display(), ?args, "computing dependency diff");
        let run = RealCommand::new(self.npm.clone(), args).current_dir(dir).run_captured()?;
        if !run.outcome.is_success() {
            let tail: Vec<&str> = run.stderr.lines().rev().take(8).collect();
            let tail: Vec<&str> = tail.into_iter().rev().collect();
            bail!(
                "npm dependency resolution failed (exit {:?}):\n{}",
                run.outcome.code,
                tail.join("\n")
            );
        }
        Ok(())
    }
}

fn read_overrides(cwd: &Path) -> Overrides {
    fs::read_to_string(cwd.join("package.json"))
        .ok()
        .and_then(|text| serde_json::from_str::<Value>(&text).ok())
        .map(|manifest| Overrides::from_manifest(&manifest))
        .unwrap_or_else(Overrides::empty)
}

/// Packages an `npx`/`npm exec` call would fetch: every `--package`, or
/// else the command itself unless the project under `cwd` provides it.
pub fn exec_packages(args: &[String], cwd: &Path) -> Vec<String> {
    let mut explicit = Vec::new();
    let mut command = None;
    let mut iter = args.iter();
    if matches!(args.first().map(String::as_str), Some("exec" | "x")) {
        iter.next();
    }
    while let Some(arg) = iter.next() {
        if arg == "--" {
            command = iter.next().cloned();
            break;
        }
        if let Some(value) = arg.strip_prefix("--package=") {
            explicit.push(value.to_string());
        } else if arg == "--package" || arg == "-p" {
            if let Some(value) = iter.next() {
                explicit.push(value.clone());
            }
        } else if arg == "-c" || arg == "--call" {
            iter.next();
        } else if !arg.starts_with('-') {
            command = Some(arg.clone());
            break;
        }
    }
    if !explicit.is_empty() {
        return explicit;
    }
    match command {
        Some(command) => match local_bin(cwd, &command) {
            Some(bin) => {
                tracing::debug!(bin = %bin.display(), "exec runs a project bin; nothing to fetch");
                Vec::new()
            }
            None => vec![command],
        },
        None => Vec::new(),
    }
}

/// The project bin npm runs for a bare command name. Lookup happens in the
/// nearest ancestor holding `package.json` or `node_modules`.
fn local_bin(cwd: &Path, command: &str) -> Option<PathBuf> {
    if command.contains('/') || command.rfind('@').is_some_and(|at| at > 0) {
        return None;
    }
    let root = cwd
        .ancestors()
        .find(|dir| dir.join("package.json").is_file() || dir.join("node_modules").is_dir())?;
    let bin = root.join("node_modules").join(".bin").join(command);
    bin.exists().then_some(bin)
}

/// Package specs named on an install-family command line.
pub fn install_specs(args: &[String]) -> Vec<String> {
    let mut specs = Vec::new();
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        if VALUE_FLAGS.contains(&arg.as_str()) {
            iter.next();
        } else if !arg.starts_with('-') {
            specs.push(arg.clone());
        }
    }
    specs
}
