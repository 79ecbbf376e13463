use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use anyhow::{Context, Result};

use sockwarden_core::types::ExitOutcome;

/// An invocation of the real package-manager binary.
#[derive(Debug, Clone)]
pub struct RealCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: HashMap<String, String>,
}

/// Captured output of a non-interactive run.
#[derive(Debug, Clone)]
pub struct CapturedRun {
    pub outcome: ExitOutcome,
    pub stdout: String,
    pub stderr: String,
}

impl RealCommand {
    pub fn new(program: PathBuf, args: Vec<String>) -> Self {
        Self {
            program,
            args,
            cwd: None,
            env: HashMap::new(),
        }
    }

    pub fn current_dir(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).envs(&self.env);
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        cmd
    }

    /// Runs with the terminal inherited and waits for exit.
    pub fn run(&self) -> Result<ExitOutcome> {
        tracing::debug!(
            program = %self.program.display(),
            args = ?self.args,
            "running real command"
        );
        let status = self
            .command()
            .status()
            .with_context(|| format!("launch {}", self.program.display()))?;
        Ok(ExitOutcome::from_status(status))
    }

    /// Runs detached from the terminal, capturing output.
    pub fn run_captured(&self) -> Result<CapturedRun> {
        let output = self
            .command()
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("launch {}", self.program.display()))?;
        Ok(CapturedRun {
            outcome: ExitOutcome::from_status(output.status),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Mirrors a child's exit: re-raise its signal on ourselves, else return its code.
pub fn propagate_exit(outcome: ExitOutcome) -> i32 {
    if let Some(signal) = outcome.signal {
        unsafe {
            libc::signal(signal, libc::SIG_DFL);
            libc::kill(libc::getpid(), signal);
        }
        return 128 + signal;
    }
    outcome.code.unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh() -> PathBuf {
        PathBuf::from("/bin/sh")
    }

    #[test]
    fn captures_output_and_code() {
        let run = RealCommand::new(sh(), vec!["-c".into(), "echo hi; exit 3".into()])
            .run_captured()
            .unwrap();
        assert_eq!(run.outcome.code, Some(3));
        assert_eq!(run.stdout.trim(), "hi");
    }

    #[test]
    fn passes_env_and_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let run = RealCommand::new(sh(), vec!["-c".into(), "echo $SOCKWARDEN_MARKER; pwd".into()])
            .current_dir(dir.path())
            .env("SOCKWARDEN_MARKER", "yes")
            .run_captured()
            .unwrap();
        let mut lines = run.stdout.lines();
        assert_eq!(lines.next(), Some("yes"));
        assert!(run.outcome.is_success());
    }

    #[test]
    fn exit_code_passthrough() {
        assert_eq!(propagate_exit(ExitOutcome::from_code(0)), 0);
        assert_eq!(propagate_exit(ExitOutcome::from_code(42)), 42);
    }
}
