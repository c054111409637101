//! Normalizes extractor progress events into registry updates.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::models::{JobStatus, PlaylistRef, TrackSnapshot};
use super::registry::JobRegistry;
use crate::extractor::{ProgressEvent, ProgressReceiver};

/// Writes the progress of one track job (and its playlist snapshot, if any).
///
/// Never fails: registry errors are logged and dropped so that reporting can
/// not disturb the transfer it observes.
pub struct ProgressReporter {
    registry: Arc<JobRegistry>,
    job_id: String,
    parent: Option<PlaylistRef>,
    format_label: String,
}

impl ProgressReporter {
    pub fn new(
        registry: Arc<JobRegistry>,
        job_id: impl Into<String>,
        parent: Option<PlaylistRef>,
        audio_format: &str,
    ) -> Self {
        Self {
            registry,
            job_id: job_id.into(),
            parent,
            format_label: audio_format.to_uppercase(),
        }
    }

    /// Drains `events` on a dedicated task until every sender is dropped.
    ///
    /// Awaiting the returned handle guarantees that no event is applied after it.
    pub fn spawn(self, mut events: ProgressReceiver) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                self.handle(event);
            }
        })
    }

    pub fn handle(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Downloading {
                downloaded_bytes,
                total_bytes,
                total_bytes_estimate,
                speed,
                eta,
                title,
            } => {
                let total = total_bytes
                    .filter(|t| *t > 0)
                    .or(total_bytes_estimate.filter(|t| *t > 0));
                let computed = match total {
                    Some(total) => (downloaded_bytes as f64 / total as f64 * 100.0).clamp(0.0, 100.0),
                    None => 0.0,
                };

                let mut percentage = computed;
                let mut status = JobStatus::Downloading;
                let result = self.registry.update_job(&self.job_id, |job| {
                    percentage = computed.max(job.percentage);
                    job.percentage = percentage;
                    job.downloaded_bytes = Some(downloaded_bytes);
                    job.total_bytes = total;
                    job.speed = speed;
                    job.eta = eta;
                    // Late ticks never move a job back out of processing.
                    if job.status == JobStatus::Processing {
                        status = JobStatus::Processing;
                        return;
                    }
                    job.status = JobStatus::Downloading;
                    job.message = match title.as_deref().or(job.title.as_deref()) {
                        Some(t) => format!("Downloading: {}", t),
                        None => "Downloading...".to_string(),
                    };
                });
                if let Err(err) = result {
                    debug!("Dropped progress tick for {}: {}", self.job_id, err);
                    return;
                }

                self.write_snapshot(status, percentage, title);
            }
            ProgressEvent::Finished { title } => {
                let result = self.registry.update_job(&self.job_id, |job| {
                    job.status = JobStatus::Processing;
                    job.percentage = 100.0;
                    job.message = format!("Converting to {}...", self.format_label);
                });
                if let Err(err) = result {
                    debug!("Dropped finished event for {}: {}", self.job_id, err);
                    return;
                }

                self.write_snapshot(JobStatus::Processing, 100.0, title);
            }
            ProgressEvent::Error { message } => {
                warn!("Extractor reported an error for {}: {}", self.job_id, message);
            }
        }
    }

    fn write_snapshot(&self, status: JobStatus, percentage: f64, title: Option<String>) {
        let Some(parent) = &self.parent else {
            return;
        };
        let title = title.unwrap_or_else(|| parent.placeholder_title());
        if let Err(err) = self.registry.set_track_snapshot(
            &parent.playlist_id,
            parent.track_index,
            TrackSnapshot::new(status, percentage, title),
        ) {
            debug!(
                "Dropped snapshot for track {} of {}: {}",
                parent.track_index, parent.playlist_id, err
            );
        }
    }
}
