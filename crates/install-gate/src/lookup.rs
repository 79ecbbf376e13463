//! The rule table, built once in the background at startup. Callers await
//! it rather than polling.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use tokio::sync::watch;

use policy_engine::UxLookup;
use risk_scanner::SettingsSource;
use sockwarden_core::{AbortSignal, PolicySettings};

#[derive(Clone)]
pub struct SharedLookup {
    rx: watch::Receiver<Option<Arc<UxLookup>>>,
}

impl SharedLookup {
    /// Fetches organization settings and overlays `local` on them. If the
    /// fetch fails, the local policy stands alone.
    pub fn spawn(source: Arc<dyn SettingsSource>, local: PolicySettings) -> Self {
        let (tx, rx) = watch::channel(None);
        tokio::spawn(async move {
            let settings = match source.fetch().await {
                Ok(remote) => remote.overlay(&local),
                Err(err) => {
                    tracing::warn!(
                        "could not load organization settings, using local policy only: {err:#}"
                    );
                    PolicySettings::default().overlay(&local)
                }
            };
            let _ = tx.send(Some(Arc::new(UxLookup::new(settings))));
        });
        Self { rx }
    }

    pub fn ready(lookup: UxLookup) -> Self {
        let (_tx, rx) = watch::channel(Some(Arc::new(lookup)));
        Self { rx }
    }

    pub async fn get(&self, abort: &AbortSignal) -> Result<Arc<UxLookup>> {
        let mut rx = self.rx.clone();
        let ready = abort.run(rx.wait_for(Option::is_some)).await?;
        let lookup = match ready {
            Ok(value) => (*value).clone(),
            Err(_) => None,
        };
        lookup.ok_or_else(|| anyhow!("settings loader stopped before producing a policy"))
    }
}
