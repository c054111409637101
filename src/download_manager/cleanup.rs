//! Delayed, best-effort deletion of finished artifacts.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::server::metrics;

#[derive(Debug, Clone)]
pub struct CleanupScheduler {
    delay: Duration,
}

impl CleanupScheduler {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Deletes `path` once the configured delay has elapsed.
    ///
    /// Scheduled deletions cannot be cancelled. Failures are logged only.
    pub fn schedule(&self, path: PathBuf) -> JoinHandle<()> {
        self.schedule_many(vec![path])
    }

    /// Deletes every path in `paths` from a single task after the delay.
    pub fn schedule_many(&self, paths: Vec<PathBuf>) -> JoinHandle<()> {
        let delay = self.delay;
        debug!("Scheduling cleanup of {} file(s) in {:?}", paths.len(), delay);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            for path in paths {
                remove_artifact(&path).await;
            }
        })
    }
}

async fn remove_artifact(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            info!("Cleaned up file: {}", path.display());
            metrics::record_cleanup("deleted");
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("Cleanup target already gone: {}", path.display());
            metrics::record_cleanup("missing");
        }
        Err(e) => {
            warn!("Error cleaning up file {}: {}", path.display(), e);
            metrics::record_cleanup("failed");
        }
    }
}
