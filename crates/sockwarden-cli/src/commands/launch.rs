use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use diff_engine::{
    DryRunReifier, NoPrefetch, NpmCachePrefetcher, NpmResolverFactory, Operation, Prefetcher,
    ReifyOptions,
};
use install_gate::{GateContext, InstallGate, Progress, SharedLookup};
use risk_scanner::{ScanClient, SettingsClient};
use shadow_bin::command::propagate_exit;
use shadow_bin::{find_real_binary, install_links, npm_install_root, RealCommand};
use sockwarden_core::config::{Config, ConfigPaths};
use sockwarden_core::{abort_pair, env, ExitOutcome};
use tty_arbiter::{ArbiterOptions, TtyArbiter};

use crate::launcher::{classify, Tool};

pub struct LaunchInputs {
    pub config_path: Option<PathBuf>,
    pub tool: Tool,
    pub args: Vec<String>,
}

struct GatedRun {
    config: Config,
    operation: Operation,
    npm: PathBuf,
    program: PathBuf,
    args: Vec<String>,
    cwd: PathBuf,
}

pub fn execute(inputs: LaunchInputs) -> Result<i32> {
    let paths = ConfigPaths::resolve()?;
    let config = Config::load_or_default(inputs.config_path.as_deref(), &paths)?;
    let shim_dir = config.shim_dir(&paths);
    let cwd = std::env::current_dir().context("read current directory")?;

    let program = install_links(&shim_dir, inputs.tool.bin_name());
    let npm = match inputs.tool {
        Tool::Npm => program.clone(),
        Tool::Npx => find_real_binary("npm", &shim_dir, std::env::var_os("PATH"), &cwd)?,
    };
    let root = npm_install_root(&npm)?;
    tracing::debug!(
        root = %root.path.display(),
        version = root.version.as_deref().unwrap_or("unknown"),
        "using npm"
    );

    let Some(operation) = classify(inputs.tool, &inputs.args) else {
        tracing::debug!(args = ?inputs.args, "passing through");
        let outcome = RealCommand::new(program, inputs.args).run()?;
        return Ok(propagate_exit(outcome));
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("start async runtime")?;
    let outcome = runtime.block_on(gated(GatedRun {
        config,
        operation,
        npm,
        program,
        args: inputs.args,
        cwd,
    }))?;
    runtime.shutdown_background();
    Ok(propagate_exit(outcome))
}

async fn gated(run: GatedRun) -> Result<ExitOutcome> {
    let (abort_handle, abort) = abort_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            abort_handle.abort();
        }
    });

    let progress = Arc::new(Progress::for_stderr());
    let arbiter = Arc::new(TtyArbiter::start(ArbiterOptions::from_env(
        progress.clone(),
        abort.clone(),
    ))?);

    let GatedRun {
        config,
        operation,
        npm,
        program,
        args,
        cwd,
    } = run;
    let result = async {
        let scanner = Arc::new(ScanClient::from_config(&config.api)?);
        let settings = Arc::new(SettingsClient::from_config(&config.api)?);
        let prefetcher: Arc<dyn Prefetcher> = if config.gate.prefetch {
            Arc::new(NpmCachePrefetcher::new(npm.clone()))
        } else {
            Arc::new(NoPrefetch)
        };
        let mut gate = InstallGate::new(GateContext {
            scanner,
            lookup: SharedLookup::spawn(settings, config.policy.clone()),
            arbiter: Arc::clone(&arbiter),
            prefetcher,
            progress,
            abort,
            accept_risks: env::flag(env::ACCEPT_RISKS),
        });
        let reifier = DryRunReifier::new(
            Arc::new(NpmResolverFactory::new(npm, program)),
            config.registry.public_origin.clone(),
            config.gate.walk_limit,
        );
        let options = ReifyOptions::new(operation, args, cwd);
        reifier.reify(&options, &mut gate).await
    }
    .await;

    let cleanup = arbiter.cleanup();
    let outcome = result?;
    cleanup?;
    Ok(outcome)
}
