//! The interception point: every mutating reify is dry-run first, and only
//! applied once the gate agrees.

use std::io::Write;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;

use sockwarden_core::{ExitOutcome, InstallEffect, SockwardenError};

use crate::resolver::{Reified, ReifyOptions, ResolverFactory};
use crate::tree::DiffTree;
use crate::walk::collect_effects;

/// Decides whether a set of pending changes may be applied.
#[async_trait]
pub trait EffectGate: Send {
    async fn evaluate(&mut self, effects: Vec<InstallEffect>) -> Result<bool>;
}

pub struct DryRunReifier {
    factory: Arc<dyn ResolverFactory>,
    public_origin: String,
    walk_limit: usize,
}

impl DryRunReifier {
    pub fn new(
        factory: Arc<dyn ResolverFactory>,
        public_origin: impl Into<String>,
        walk_limit: usize,
    ) -> Self {
        Self {
            factory,
            public_origin: public_origin.into(),
            walk_limit,
        }
    }

    /// Dry-runs `options`, hands public-registry changes to `gate`, and
    /// applies with a fresh resolver only if the gate agrees. A declined
    /// gate surfaces as `SockwardenError::Declined`.
    pub async fn reify(
        &self,
        options: &ReifyOptions,
        gate: &mut dyn EffectGate,
    ) -> Result<ExitOutcome> {
        if options.dry_run {
            let tree = self.dry_run(options.clone()).await?;
            let mut stdout = std::io::stdout().lock();
            print_diff(&tree, &mut stdout).context("write dry-run diff")?;
            return Ok(ExitOutcome::success());
        }

        let tree = self.dry_run(options.as_dry_run()).await?;
        let effects = collect_effects(&tree, self.walk_limit)?;
        tracing::debug!(effects = effects.len(), "collected install effects");

        let public: Vec<InstallEffect> = effects
            .into_iter()
            .filter(|effect| effect.is_from(&self.public_origin))
            .collect();
        if public.is_empty() {
            tracing::debug!("no public registry changes; skipping scan");
        } else if !gate.evaluate(public).await? {
            return Err(SockwardenError::Declined.into());
        }

        self.apply(options.clone()).await
    }

    async fn dry_run(&self, options: ReifyOptions) -> Result<DiffTree> {
        match self.run(options).await? {
            Reified::Diff(tree) => Ok(tree),
            Reified::Applied(_) => Err(anyhow!("resolver applied changes during a dry run")),
        }
    }

    async fn apply(&self, options: ReifyOptions) -> Result<ExitOutcome> {
        match self.run(options).await? {
            Reified::Applied(outcome) => Ok(outcome),
            Reified::Diff(_) => Err(anyhow!("resolver returned a diff for a real run")),
        }
    }

    /// Each call gets a fresh resolver, run off the async workers.
    async fn run(&self, options: ReifyOptions) -> Result<Reified> {
        let mut resolver = self.factory.create();
        tokio::task::spawn_blocking(move || resolver.reify(&options))
            .await
            .context("join resolver task")?
    }
}

/// `add|change|remove name version` per changed node.
pub fn print_diff(tree: &DiffTree, out: &mut impl Write) -> std::io::Result<()> {
    for node in tree.changes() {
        let pkg = node.ideal.as_ref().or(node.actual.as_ref());
        let (Some(action), Some(pkg)) = (node.action, pkg) else {
            continue;
        };
        writeln!(out, "{action} {} {}", pkg.name, pkg.version)?;
    }
    Ok(())
}
