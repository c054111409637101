//! Runs one track from URL to tagged file in the permanent store.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::cleanup::CleanupScheduler;
use super::error::DownloadError;
use super::models::{JobStatus, PlaylistJob, PlaylistRef, TrackJob, TrackSnapshot};
use super::progress::ProgressReporter;
use super::registry::JobRegistry;
use super::storage::{self, FileStore};
use crate::config::CleanupTrigger;
use crate::extractor::MediaExtractor;
use crate::server::metrics;
use crate::tagger::{AudioTagger, TrackTags};

/// Collaborators and settings shared by every runner.
#[derive(Clone)]
pub struct JobContext {
    pub registry: Arc<JobRegistry>,
    pub extractor: Arc<dyn MediaExtractor>,
    pub tagger: Arc<dyn AudioTagger>,
    pub store: FileStore,
    pub cleanup: CleanupScheduler,
    pub cleanup_trigger: CleanupTrigger,
    /// Target extension, e.g. `mp3`.
    pub audio_format: String,
}

impl JobContext {
    pub(super) fn update_job<F>(&self, job_id: &str, update: F)
    where
        F: FnOnce(&mut TrackJob),
    {
        if let Err(e) = self.registry.update_job(job_id, update) {
            debug!("Skipped update of job {}: {}", job_id, e);
        }
    }

    pub(super) fn update_playlist<F>(&self, playlist_id: &str, update: F)
    where
        F: FnOnce(&mut PlaylistJob),
    {
        if let Err(e) = self.registry.update_playlist(playlist_id, update) {
            debug!("Skipped update of playlist {}: {}", playlist_id, e);
        }
    }

    pub(super) fn write_snapshot(&self, parent: Option<&PlaylistRef>, snapshot: TrackSnapshot) {
        let Some(parent) = parent else {
            return;
        };
        if let Err(e) =
            self.registry
                .set_track_snapshot(&parent.playlist_id, parent.track_index, snapshot)
        {
            debug!(
                "Skipped snapshot of track {} in {}: {}",
                parent.track_index, parent.playlist_id, e
            );
        }
    }
}

/// Downloads `url` for the already registered job `job_id`.
///
/// Returns the final file path on success. Failures are written to the
/// registry (and the parent playlist's snapshot) and yield `None`.
pub async fn run_track(
    ctx: &JobContext,
    url: &str,
    job_id: &str,
    parent: Option<&PlaylistRef>,
) -> Option<PathBuf> {
    match execute(ctx, url, job_id, parent).await {
        Ok(path) => Some(path),
        Err(err) => {
            let message = err.user_message();
            error!("Download {} failed: {}", job_id, err);
            metrics::record_download_failure(err.kind().as_str());
            ctx.update_job(job_id, |job| job.fail(&message));

            if let Some(parent) = parent {
                let title = ctx
                    .registry
                    .get_job(job_id)
                    .and_then(|job| job.title)
                    .unwrap_or_else(|| parent.placeholder_title());
                ctx.write_snapshot(Some(parent), TrackSnapshot::failed(title, &message));
            }
            None
        }
    }
}

async fn execute(
    ctx: &JobContext,
    url: &str,
    job_id: &str,
    parent: Option<&PlaylistRef>,
) -> Result<PathBuf, DownloadError> {
    // Removed on every return path when the guard drops.
    let staging = ctx.store.create_staging_dir()?;

    ctx.update_job(job_id, |job| {
        job.status = JobStatus::Extracting;
        job.message = "Extracting track information...".to_string();
    });

    let info = ctx
        .extractor
        .extract_info(url)
        .await?
        .ok_or(DownloadError::ExtractionFailure)?;
    let title = info.display_title();
    let artist = info.display_artist();
    debug!("Job {} resolved to '{}' by '{}'", job_id, title, artist);

    ctx.update_job(job_id, |job| {
        job.title = Some(title.clone());
        job.artist = Some(artist.clone());
    });
    ctx.write_snapshot(
        parent,
        TrackSnapshot::new(JobStatus::Extracting, 0.0, title.clone()),
    );

    let (tx, rx) = mpsc::unbounded_channel();
    let pump = ProgressReporter::new(
        ctx.registry.clone(),
        job_id,
        parent.cloned(),
        &ctx.audio_format,
    )
    .spawn(rx);
    let transfer = ctx.extractor.download(url, staging.path(), tx).await;
    // Every tick is applied before the job can turn terminal.
    if let Err(e) = pump.await {
        warn!("Progress reporting for {} ended abnormally: {}", job_id, e);
    }
    transfer?;

    let output = storage::find_output(staging.path(), &ctx.audio_format)
        .await?
        .ok_or(DownloadError::NoOutputFile)?;

    let album = info.album.clone().or_else(|| {
        parent
            .and_then(|p| ctx.registry.get_playlist(&p.playlist_id))
            .and_then(|playlist| playlist.playlist_title)
    });
    let tags = TrackTags {
        title: title.clone(),
        artist: artist.clone(),
        album,
        cover_url: info.thumbnail.clone(),
    };
    if let Err(e) = ctx.tagger.write_tags(&output, &tags).await {
        warn!("Failed to add metadata to {}: {}", output.display(), e);
    }

    let (final_path, filename) = ctx.store.promote(&output, job_id).await?;

    ctx.update_job(job_id, |job| {
        job.complete(final_path.clone(), filename, title.clone(), artist.clone())
    });
    ctx.write_snapshot(
        parent,
        TrackSnapshot::new(JobStatus::Completed, 100.0, title.clone()),
    );
    info!("Download {} completed: {}", job_id, final_path.display());

    if parent.is_none() && ctx.cleanup_trigger == CleanupTrigger::Completion {
        ctx.cleanup.schedule(final_path.clone());
    }

    Ok(final_path)
}
