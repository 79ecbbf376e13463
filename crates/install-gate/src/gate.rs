//! Scan, classify, and if anything needs a human, ask one.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures_util::StreamExt;

use diff_engine::{EffectGate, Prefetcher};
use policy_engine::{UxDecision, UxLookup};
use risk_scanner::{PackageScanner, PackageVerdict, MISSING_ISSUE};
use sockwarden_core::{AbortSignal, InstallEffect, SockwardenError};
use tty_arbiter::{TtyArbiter, TtySession};

use crate::lookup::SharedLookup;
use crate::progress::Progress;
use crate::render::{render_report, ClassifiedFinding, PackageFindings};

/// Everything one gate evaluation needs, built once at startup.
pub struct GateContext {
    pub scanner: Arc<dyn PackageScanner>,
    pub lookup: SharedLookup,
    pub arbiter: Arc<TtyArbiter>,
    pub prefetcher: Arc<dyn Prefetcher>,
    pub progress: Arc<Progress>,
    pub abort: AbortSignal,
    /// Proceed without asking, whatever is found.
    pub accept_risks: bool,
}

#[derive(Debug, Default)]
pub struct Classification {
    pub any_blocking: bool,
    pub any_display: bool,
    /// Packages with at least one finding worth showing, in arrival order.
    pub packages: Vec<PackageFindings>,
}

pub struct InstallGate {
    ctx: GateContext,
}

impl InstallGate {
    pub fn new(ctx: GateContext) -> Self {
        Self { ctx }
    }

    /// Scans `effects` and resolves every finding against policy. Verdicts
    /// are handled strictly in arrival order.
    pub async fn classify(&self, effects: &[InstallEffect]) -> Result<Classification> {
        let lookup = self.ctx.lookup.get(&self.ctx.abort).await?;

        let mut previous: HashMap<&str, &str> = HashMap::new();
        let mut pkgids: Vec<String> = Vec::new();
        for effect in effects {
            if !pkgids.contains(&effect.pkgid) {
                pkgids.push(effect.pkgid.clone());
            }
            if let Some(existing) = effect.existing.as_deref() {
                previous.entry(effect.pkgid.as_str()).or_insert(existing);
            }
        }

        let mut remaining = pkgids.len();
        self.ctx.progress.set(looking_up(remaining));
        let result = self.classify_stream(&lookup, &pkgids, &previous, &mut remaining).await;
        self.ctx.progress.clear();
        result
    }

    async fn classify_stream(
        &self,
        lookup: &UxLookup,
        pkgids: &[String],
        previous: &HashMap<&str, &str>,
        remaining: &mut usize,
    ) -> Result<Classification> {
        let abort = &self.ctx.abort;
        let mut stream = abort.run(self.ctx.scanner.batch_scan(pkgids)).await??;
        let mut classification = Classification::default();

        while let Some(verdict) = abort.run(stream.next()).await? {
            let verdict = verdict?;
            *remaining = remaining.saturating_sub(1);
            self.ctx.progress.set(looking_up(*remaining));

            let pkgid = verdict.package().to_string();
            let existing = previous.get(pkgid.as_str()).map(|id| id.to_string());
            let findings = match &verdict {
                PackageVerdict::Missing { .. } => vec![ClassifiedFinding {
                    issue_type: MISSING_ISSUE.to_string(),
                    severity: None,
                    decision: lookup.lookup(MISSING_ISSUE).merge(UxDecision::WARN),
                }],
                PackageVerdict::Success { .. } => {
                    let known = match existing.as_deref() {
                        Some(prior) => self.issue_types_of(prior).await?,
                        None => HashSet::new(),
                    };
                    verdict
                        .issues()
                        .iter()
                        .filter(|issue| !known.contains(&issue.issue_type))
                        .map(|issue| ClassifiedFinding {
                            issue_type: issue.issue_type.clone(),
                            severity: issue.severity.clone(),
                            decision: lookup.lookup(&issue.issue_type),
                        })
                        .filter(|finding| finding.decision.display || finding.decision.block)
                        .collect()
                }
            };

            let blocking = findings.iter().any(|finding| finding.decision.block);
            classification.any_blocking |= blocking;
            classification.any_display |= findings.iter().any(|finding| finding.decision.display);
            if !blocking {
                self.ctx.prefetcher.prefetch(&pkgid);
            }
            if !findings.is_empty() {
                classification.packages.push(PackageFindings {
                    pkgid,
                    existing,
                    findings,
                });
            }
        }

        tracing::debug!(
            blocking = classification.any_blocking,
            display = classification.any_display,
            "classified scan results"
        );
        Ok(classification)
    }

    /// Finding types the previous version already had; those were accepted
    /// when it was installed.
    async fn issue_types_of(&self, pkgid: &str) -> Result<HashSet<String>> {
        let abort = &self.ctx.abort;
        let mut stream = abort.run(self.ctx.scanner.batch_scan(&[pkgid.to_string()])).await??;
        let mut types = HashSet::new();
        while let Some(verdict) = abort.run(stream.next()).await? {
            types.extend(verdict?.issues().iter().map(|issue| issue.issue_type.clone()));
        }
        Ok(types)
    }

    /// Turns a classification into proceed (`true`) or decline (`false`).
    pub async fn decide(&self, classification: Classification) -> Result<bool> {
        if !classification.any_blocking && !classification.any_display {
            tracing::info!("no risks found");
            return Ok(true);
        }
        if self.ctx.accept_risks {
            tracing::warn!("accepting risks without prompting");
            return Ok(true);
        }
        let Classification {
            any_blocking,
            packages,
            ..
        } = classification;
        let accepted = self
            .ctx
            .arbiter
            .capture(move |tty| Box::pin(async move { prompt(tty, &packages, any_blocking).await }))
            .await?;
        tracing::info!(accepted, "risk prompt answered");
        Ok(accepted)
    }
}

#[async_trait]
impl EffectGate for InstallGate {
    async fn evaluate(&mut self, effects: Vec<InstallEffect>) -> Result<bool> {
        let classification = self.classify(&effects).await?;
        self.decide(classification).await
    }
}

fn looking_up(remaining: usize) -> String {
    match remaining {
        1 => "Looking up data for 1 package".to_string(),
        n => format!("Looking up data for {n} packages"),
    }
}

/// Shows the findings and asks until the answer is a clear yes or no.
/// Without input, display-only findings pass and blocking ones cannot.
pub async fn prompt(
    tty: &mut TtySession<'_>,
    packages: &[PackageFindings],
    any_blocking: bool,
) -> Result<bool> {
    tty.write_str(&render_report(packages, tty.color_level() > 0)).await?;
    if !tty.has_input() {
        if any_blocking {
            return Err(SockwardenError::CannotPrompt.into());
        }
        return Ok(true);
    }
    loop {
        tty.write_str("Accept risks of installing these packages? (y/N) ").await?;
        let Some(answer) = tty.read_line().await? else {
            tty.write_str("\n").await?;
            return Ok(false);
        };
        match parse_answer(&answer) {
            Some(accepted) => return Ok(accepted),
            None => tty.write_line("Please answer yes or no.").await?,
        }
    }
}

/// `y`/`yes` accept; empty, `n` and `no` decline; anything else is unclear.
pub fn parse_answer(answer: &str) -> Option<bool> {
    match answer.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Some(true),
        "" | "n" | "no" => Some(false),
        _ => None,
    }
}
