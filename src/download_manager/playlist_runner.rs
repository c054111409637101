//! Fans a playlist out into sequential track jobs and packs the results.

use std::path::PathBuf;

use tracing::{error, info};

use super::error::DownloadError;
use super::models::{
    JobStatus, PlaylistJob, PlaylistRef, PlaylistStatus, TrackJob, TrackSnapshot,
};
use super::storage;
use super::track_runner::{run_track, JobContext};
use crate::config::CleanupTrigger;
use crate::extractor::PlaylistEntry;

/// Runs the already registered playlist job `playlist_id` to a terminal state.
pub async fn run_playlist(ctx: &JobContext, url: &str, playlist_id: &str) {
    if let Err(err) = execute(ctx, url, playlist_id).await {
        let message = err.user_message();
        error!("Playlist download {} failed: {}", playlist_id, err);
        ctx.update_playlist(playlist_id, |playlist| playlist.fail(&message));
    }
}

async fn execute(ctx: &JobContext, url: &str, playlist_id: &str) -> Result<(), DownloadError> {
    let info = ctx.extractor.extract_playlist(url).await?;

    let playlist_title = info
        .as_ref()
        .map(|i| i.display_title())
        .unwrap_or_else(|| crate::extractor::UNKNOWN_PLAYLIST.to_string());
    // Null or URL-less members keep their position but are skipped entirely.
    let entries: Vec<(usize, PlaylistEntry, String)> = info
        .and_then(|i| i.entries)
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| {
            let entry = entry?;
            let url = entry.track_url()?;
            Some((index, entry, url))
        })
        .collect();

    if entries.is_empty() {
        return Err(DownloadError::NoTracksFound);
    }

    let total = entries.len();
    info!(
        "Playlist {} '{}' has {} tracks",
        playlist_id, playlist_title, total
    );
    ctx.update_playlist(playlist_id, |playlist| {
        playlist.status = PlaylistStatus::Downloading;
        playlist.total_tracks = total;
        playlist.playlist_title = Some(playlist_title.clone());
        playlist.message = format!("Found {} tracks. Starting downloads...", total);
    });

    let mut downloaded: Vec<PathBuf> = Vec::new();
    for (ordinal, (index, entry, track_url)) in entries.iter().enumerate() {
        let parent = PlaylistRef::new(playlist_id, *index);

        ctx.update_playlist(playlist_id, |playlist| {
            playlist.message = format!("Downloading track {}/{}", ordinal + 1, total);
        });

        if let Some(path) = download_member(ctx, &parent, entry, track_url).await {
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                downloaded.push(path);
            }
        }

        let completed = downloaded.len();
        ctx.update_playlist(playlist_id, |playlist| {
            playlist.completed_tracks = completed;
            playlist.recompute_percentage();
        });
    }

    if downloaded.is_empty() {
        return Err(DownloadError::NoTracksDownloaded);
    }

    ctx.update_playlist(playlist_id, |playlist| {
        playlist.message = "Creating ZIP file...".to_string();
    });
    let (zip_path, zip_filename) = ctx.store.archive_path(playlist_id);
    storage::write_archive(zip_path.clone(), downloaded.clone()).await?;

    let count = downloaded.len();
    ctx.update_playlist(playlist_id, |playlist| {
        playlist.complete(zip_path.clone(), zip_filename, count)
    });
    info!(
        "Playlist download {} completed: {} tracks",
        playlist_id, count
    );

    ctx.cleanup.schedule_many(downloaded);
    if ctx.cleanup_trigger == CleanupTrigger::Completion {
        ctx.cleanup.schedule(zip_path);
    }

    Ok(())
}

/// Registers and runs the child job for one playlist member.
async fn download_member(
    ctx: &JobContext,
    parent: &PlaylistRef,
    entry: &PlaylistEntry,
    url: &str,
) -> Option<PathBuf> {
    let job_id = parent.track_job_id();
    let title = entry
        .title
        .clone()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| parent.placeholder_title());

    if let Err(e) = ctx
        .registry
        .create_job(TrackJob::new(job_id.clone(), Some(parent)))
    {
        error!("Could not register track job {}: {}", job_id, e);
        return None;
    }

    ctx.write_snapshot(
        Some(parent),
        TrackSnapshot::new(JobStatus::Starting, 0.0, title),
    );

    run_track(ctx, url, &job_id, Some(parent)).await
}
