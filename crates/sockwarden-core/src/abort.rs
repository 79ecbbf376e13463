//! A single shared abort signal for network reads, terminal reads and
//! startup waits.

use std::future::Future;

use tokio::sync::watch;

use crate::error::SockwardenError;

#[derive(Debug, Clone)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

#[derive(Debug, Clone)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
}

pub fn abort_pair() -> (AbortHandle, AbortSignal) {
    let (tx, rx) = watch::channel(false);
    (AbortHandle { tx }, AbortSignal { rx })
}

impl AbortHandle {
    pub fn abort(&self) {
        self.tx.send_replace(true);
    }

    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl AbortSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        // Keep the sender alive so `aborted()` stays pending.
        std::mem::forget(tx);
        Self { rx }
    }

    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the abort fires. Pends forever if the handle is dropped unfired.
    pub async fn aborted(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|fired| *fired).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Runs `future` unless the signal fires first.
    pub async fn run<F, T>(&self, future: F) -> Result<T, SockwardenError>
    where
        F: Future<Output = T>,
    {
        if self.is_aborted() {
            return Err(SockwardenError::Aborted);
        }
        tokio::select! {
            _ = self.aborted() => Err(SockwardenError::Aborted),
            value = future => Ok(value),
        }
    }
}
