use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Mutex;

use tokio::process::{Child, Command};

/// Warms the package cache ahead of the real install. Best effort: a
/// failed prefetch is logged and otherwise ignored.
pub trait Prefetcher: Send + Sync {
    fn prefetch(&self, pkgid: &str);
}

pub struct NoPrefetch;

impl Prefetcher for NoPrefetch {
    fn prefetch(&self, _pkgid: &str) {}
}

/// Runs `npm cache add <pkgid>` in the background. Children still running
/// when this is dropped are killed.
pub struct NpmCachePrefetcher {
    npm: PathBuf,
    children: Mutex<Vec<Child>>,
}

impl NpmCachePrefetcher {
    pub fn new(npm: PathBuf) -> Self {
        Self {
            npm,
            children: Mutex::new(Vec::new()),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.children.lock().map(|children| children.len()).unwrap_or(0)
    }
}

impl Prefetcher for NpmCachePrefetcher {
    fn prefetch(&self, pkgid: &str) {
        let spawned = Command::new(&self.npm)
            .args(["cache", "add", pkgid])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn();
        match spawned {
            Ok(child) => {
                tracing::debug!(%pkgid, "prefetching tarball");
                if let Ok(mut children) = self.children.lock() {
                    children.retain_mut(|child| matches!(child.try_wait(), Ok(None)));
                    children.push(child);
                }
            }
            Err(err) => tracing::debug!(%pkgid, "prefetch did not start: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_binary_is_ignored() {
        let prefetcher = NpmCachePrefetcher::new(PathBuf::from("/nonexistent/npm"));
        prefetcher.prefetch("left-pad@1.3.0");
        assert_eq!(prefetcher.in_flight(), 0);
    }

    #[tokio::test]
    async fn tracks_running_children() {
        let prefetcher = NpmCachePrefetcher::new(PathBuf::from("/bin/sleep"));
        // `sleep cache add x` fails immediately; only the spawn matters here.
        prefetcher.prefetch("left-pad@1.3.0");
        assert_eq!(prefetcher.in_flight(), 1);
    }
}
