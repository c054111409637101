//! Download manager facade.
//!
//! Validates submissions, registers jobs and runs them in the background
//! behind a concurrency limit. HTTP handlers only talk to this type.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::{CleanupTrigger, DownloadSettings, PlatformSettings};
use crate::extractor::MediaExtractor;
use crate::platform::{Platform, PlatformPolicy, PlatformRejection};
use crate::server::metrics;
use crate::tagger::AudioTagger;

use super::cleanup::CleanupScheduler;
use super::error::DownloadError;
use super::models::{JobStatus, PlaylistJob, PlaylistStatus, TrackJob};
use super::playlist_runner::run_playlist;
use super::registry::JobRegistry;
use super::storage::FileStore;
use super::track_runner::{run_track, JobContext};

const WAITING_FOR_SLOT: &str = "Waiting for a download slot...";
const INTERNAL_FAILURE: &str = "Internal error while processing the download";

/// Why a finished file cannot be handed out.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArtifactError {
    #[error("Download not completed or not found")]
    TrackNotReady,

    #[error("File not found")]
    TrackFileMissing,

    #[error("Playlist download not completed or not found")]
    PlaylistNotReady,

    #[error("ZIP file not found")]
    ArchiveMissing,
}

/// A finished file ready to be served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    /// Name offered to the client.
    pub filename: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManagerStats {
    pub tracked_jobs: usize,
    pub tracked_playlists: usize,
    pub active_downloads: usize,
    pub max_concurrent_downloads: usize,
}

pub struct DownloadManager {
    ctx: JobContext,
    policy: PlatformPolicy,
    slots: Arc<Semaphore>,
    max_concurrent: usize,
}

impl DownloadManager {
    pub fn new(
        settings: &DownloadSettings,
        platforms: PlatformSettings,
        registry: Arc<JobRegistry>,
        extractor: Arc<dyn MediaExtractor>,
        tagger: Arc<dyn AudioTagger>,
    ) -> Self {
        let max_concurrent = settings.max_concurrent_downloads.max(1);
        let ctx = JobContext {
            registry,
            extractor,
            tagger,
            store: FileStore::new(&settings.download_dir, &settings.temp_dir),
            cleanup: CleanupScheduler::new(settings.cleanup_delay()),
            cleanup_trigger: settings.cleanup_trigger,
            audio_format: settings.audio_format.clone(),
        };
        Self {
            ctx,
            policy: PlatformPolicy::new(platforms),
            slots: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    /// Creates the download and staging directories.
    pub async fn init(&self) -> std::io::Result<()> {
        self.ctx.store.init().await?;
        info!(
            "Download manager ready, storing files in {:?}",
            self.ctx.store.download_dir()
        );
        Ok(())
    }

    /// Checks that `raw` is a well-formed URL on an allowed platform.
    ///
    /// Returns the trimmed URL together with the detected platform.
    pub fn validate(&self, raw: &str) -> Result<(String, Platform), DownloadError> {
        let url = raw.trim();
        if url.is_empty() {
            return Err(DownloadError::InvalidInput("URL is required".to_string()));
        }
        match self.policy.check(url) {
            Ok(platform) => Ok((url.to_string(), platform)),
            Err(rejection @ PlatformRejection::InvalidUrl) => {
                Err(DownloadError::InvalidInput(rejection.to_string()))
            }
            Err(rejection) => Err(DownloadError::UnsupportedPlatform(rejection.to_string())),
        }
    }

    /// Registers a single-track job for `url` and starts it in the background.
    ///
    /// `url` is expected to have gone through [`DownloadManager::validate`].
    /// Returns the new job id immediately.
    pub fn submit_track(&self, url: String) -> Result<String, DownloadError> {
        let job_id = Uuid::new_v4().to_string();
        self.ctx.registry.create_job(TrackJob::new(&job_id, None))?;
        metrics::record_job_submitted("track");
        info!("Queued download {} for {}", job_id, url);

        let ctx = self.ctx.clone();
        let slots = self.slots.clone();
        let id = job_id.clone();
        tokio::spawn(async move {
            let on_wait = || {
                ctx.update_job(&id, |job| job.message = WAITING_FOR_SLOT.to_string());
            };
            let Some(_permit) = acquire_slot(slots, on_wait).await else {
                ctx.update_job(&id, |job| job.fail(INTERNAL_FAILURE));
                return;
            };

            let started = Instant::now();
            metrics::inc_active_jobs();
            let worker = {
                let ctx = ctx.clone();
                let id = id.clone();
                tokio::spawn(async move { run_track(&ctx, &url, &id, None).await })
            };
            if let Err(e) = worker.await {
                error!("Download task {} aborted: {}", id, e);
                ctx.update_job(&id, |job| job.fail(INTERNAL_FAILURE));
            }
            metrics::dec_active_jobs();

            let outcome = match ctx.registry.get_job(&id).map(|job| job.status) {
                Some(JobStatus::Completed) => "completed",
                _ => "error",
            };
            metrics::record_job_finished("track", outcome, started.elapsed());
        });

        Ok(job_id)
    }

    /// Registers a playlist job for `url` and starts it in the background.
    ///
    /// The whole playlist holds one download slot; its members run one after
    /// the other inside it.
    pub fn submit_playlist(&self, url: String) -> Result<String, DownloadError> {
        let playlist_id = Uuid::new_v4().to_string();
        self.ctx
            .registry
            .create_playlist(PlaylistJob::new(&playlist_id))?;
        metrics::record_job_submitted("playlist");
        info!("Queued playlist download {} for {}", playlist_id, url);

        let ctx = self.ctx.clone();
        let slots = self.slots.clone();
        let id = playlist_id.clone();
        tokio::spawn(async move {
            let on_wait = || {
                ctx.update_playlist(&id, |playlist| {
                    playlist.message = WAITING_FOR_SLOT.to_string()
                });
            };
            let Some(_permit) = acquire_slot(slots, on_wait).await else {
                ctx.update_playlist(&id, |playlist| playlist.fail(INTERNAL_FAILURE));
                return;
            };

            let started = Instant::now();
            metrics::inc_active_jobs();
            let worker = {
                let ctx = ctx.clone();
                let id = id.clone();
                tokio::spawn(async move { run_playlist(&ctx, &url, &id).await })
            };
            if let Err(e) = worker.await {
                error!("Playlist task {} aborted: {}", id, e);
                ctx.update_playlist(&id, |playlist| playlist.fail(INTERNAL_FAILURE));
            }
            metrics::dec_active_jobs();

            let outcome = match ctx.registry.get_playlist(&id).map(|p| p.status) {
                Some(PlaylistStatus::Completed) => "completed",
                _ => "error",
            };
            metrics::record_job_finished("playlist", outcome, started.elapsed());
        });

        Ok(playlist_id)
    }

    pub fn get_job(&self, job_id: &str) -> Option<TrackJob> {
        self.ctx.registry.get_job(job_id)
    }

    pub fn get_playlist(&self, playlist_id: &str) -> Option<PlaylistJob> {
        self.ctx.registry.get_playlist(playlist_id)
    }

    /// Locates the finished file of a completed track job.
    pub async fn track_artifact(&self, job_id: &str) -> Result<Artifact, ArtifactError> {
        let job = self
            .ctx
            .registry
            .get_job(job_id)
            .filter(|job| job.status == JobStatus::Completed)
            .ok_or(ArtifactError::TrackNotReady)?;
        let (Some(path), Some(filename)) = (job.file_path, job.filename) else {
            return Err(ArtifactError::TrackNotReady);
        };
        if !is_file(&path).await {
            return Err(ArtifactError::TrackFileMissing);
        }
        Ok(Artifact { path, filename })
    }

    /// Locates the archive of a completed playlist job.
    pub async fn playlist_artifact(&self, playlist_id: &str) -> Result<Artifact, ArtifactError> {
        let playlist = self
            .ctx
            .registry
            .get_playlist(playlist_id)
            .filter(|p| p.status == PlaylistStatus::Completed)
            .ok_or(ArtifactError::PlaylistNotReady)?;
        let (Some(path), Some(filename)) = (playlist.zip_path, playlist.zip_filename) else {
            return Err(ArtifactError::PlaylistNotReady);
        };
        if !is_file(&path).await {
            return Err(ArtifactError::ArchiveMissing);
        }
        Ok(Artifact { path, filename })
    }

    /// Called once an artifact has been handed to a client.
    ///
    /// Starts the deletion countdown when cleanup is tied to retrieval.
    /// Repeated retrievals schedule repeated, harmless deletions.
    pub fn artifact_served(&self, artifact: &Artifact) {
        if self.ctx.cleanup_trigger == CleanupTrigger::Retrieval {
            debug!("Arming cleanup for {:?}", artifact.path);
            self.ctx.cleanup.schedule(artifact.path.clone());
        }
    }

    pub fn stats(&self) -> ManagerStats {
        ManagerStats {
            tracked_jobs: self.ctx.registry.job_count(),
            tracked_playlists: self.ctx.registry.playlist_count(),
            active_downloads: self.max_concurrent - self.slots.available_permits(),
            max_concurrent_downloads: self.max_concurrent,
        }
    }
}

/// Takes a download slot, calling `on_wait` first if none is free right now.
async fn acquire_slot(
    slots: Arc<Semaphore>,
    on_wait: impl FnOnce(),
) -> Option<OwnedSemaphorePermit> {
    match slots.clone().try_acquire_owned() {
        Ok(permit) => Some(permit),
        Err(TryAcquireError::NoPermits) => {
            on_wait();
            slots.acquire_owned().await.ok()
        }
        Err(TryAcquireError::Closed) => None,
    }
}

async fn is_file(path: &std::path::Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::{
        ExtractorError, MediaInfo, PlaylistInfo, ProgressEvent, ProgressSender,
    };
    use crate::tagger::{TaggerError, TrackTags};
    use async_trait::async_trait;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Writes `<title>.mp3` on download. Optionally waits for a gate first.
    struct StubExtractor {
        gate: Option<Arc<Semaphore>>,
    }

    #[async_trait]
    impl MediaExtractor for StubExtractor {
        async fn extract_info(&self, url: &str) -> Result<Option<MediaInfo>, ExtractorError> {
            if url.contains("gone") {
                return Err(ExtractorError::Failed(
                    "ERROR: [youtube] gone: Video unavailable".to_string(),
                ));
            }
            Ok(Some(MediaInfo {
                title: Some("Stub Song".to_string()),
                uploader: Some("Stub Artist".to_string()),
                ..Default::default()
            }))
        }

        async fn extract_playlist(
            &self,
            _url: &str,
        ) -> Result<Option<PlaylistInfo>, ExtractorError> {
            Ok(None)
        }

        async fn download(
            &self,
            _url: &str,
            output_dir: &Path,
            progress: ProgressSender,
        ) -> Result<(), ExtractorError> {
            if let Some(gate) = &self.gate {
                let _permit = gate.acquire().await;
            }
            tokio::fs::write(output_dir.join("Stub Song.mp3"), b"audio").await?;
            let _ = progress.send(ProgressEvent::Finished { title: None });
            Ok(())
        }
    }

    struct NoopTagger;

    #[async_trait]
    impl AudioTagger for NoopTagger {
        async fn write_tags(&self, _path: &Path, _tags: &TrackTags) -> Result<(), TaggerError> {
            Ok(())
        }
    }

    fn make_manager(
        dir: &TempDir,
        max_concurrent: usize,
        gate: Option<Arc<Semaphore>>,
        platforms: PlatformSettings,
    ) -> DownloadManager {
        let settings = DownloadSettings {
            download_dir: dir.path().join("downloads"),
            temp_dir: dir.path().join("tmp"),
            max_concurrent_downloads: max_concurrent,
            ..Default::default()
        };
        DownloadManager::new(
            &settings,
            platforms,
            Arc::new(JobRegistry::new()),
            Arc::new(StubExtractor { gate }),
            Arc::new(NoopTagger),
        )
    }

    async fn wait_until<F: Fn() -> bool>(condition: F) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not met in time");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[test]
    fn test_validate() {
        let dir = TempDir::new().unwrap();
        let manager = make_manager(
            &dir,
            1,
            None,
            PlatformSettings {
                bandcamp: false,
                ..Default::default()
            },
        );

        let (url, platform) = manager
            .validate("  https://www.youtube.com/watch?v=abc ")
            .unwrap();
        assert_eq!(url, "https://www.youtube.com/watch?v=abc");
        assert_eq!(platform, Platform::YouTube);

        let err = manager.validate("   ").unwrap_err();
        assert_eq!(err.to_string(), "URL is required");

        let err = manager.validate("not a url").unwrap_err();
        assert!(matches!(err, DownloadError::InvalidInput(_)));
        assert_eq!(err.to_string(), "Invalid URL format");

        let err = manager.validate("https://open.spotify.com/track/1").unwrap_err();
        assert!(matches!(err, DownloadError::UnsupportedPlatform(_)));

        let err = manager.validate("https://x.bandcamp.com/track/y").unwrap_err();
        assert_eq!(err.to_string(), "Bandcamp downloads are disabled on this server");
    }

    #[tokio::test]
    async fn test_submit_track_completes() {
        let dir = TempDir::new().unwrap();
        let manager = make_manager(&dir, 2, None, PlatformSettings::default());
        manager.init().await.unwrap();

        let job_id = manager
            .submit_track("https://www.youtube.com/watch?v=abc".to_string())
            .unwrap();
        assert!(manager.get_job(&job_id).is_some());

        wait_until(|| {
            manager
                .get_job(&job_id)
                .is_some_and(|job| job.status.is_terminal())
        })
        .await;

        let job = manager.get_job(&job_id).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.title.as_deref(), Some("Stub Song"));

        let artifact = manager.track_artifact(&job_id).await.unwrap();
        assert_eq!(artifact.filename, format!("{}_Stub Song.mp3", job_id));
        assert!(artifact.path.starts_with(dir.path().join("downloads")));
    }

    #[tokio::test]
    async fn test_submit_track_failure_is_recorded() {
        let dir = TempDir::new().unwrap();
        let manager = make_manager(&dir, 1, None, PlatformSettings::default());
        manager.init().await.unwrap();

        let job_id = manager
            .submit_track("https://www.youtube.com/watch?v=gone".to_string())
            .unwrap();
        wait_until(|| {
            manager
                .get_job(&job_id)
                .is_some_and(|job| job.status.is_terminal())
        })
        .await;

        let job = manager.get_job(&job_id).unwrap();
        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(
            job.error.as_deref(),
            Some("This video is not available. It may be private, deleted, or region-restricted.")
        );
        assert_eq!(
            manager.track_artifact(&job_id).await,
            Err(ArtifactError::TrackNotReady)
        );
    }

    #[tokio::test]
    async fn test_concurrency_limit_queues_extra_jobs() {
        let dir = TempDir::new().unwrap();
        let gate = Arc::new(Semaphore::new(0));
        let manager = make_manager(&dir, 1, Some(gate.clone()), PlatformSettings::default());
        manager.init().await.unwrap();

        let first = manager
            .submit_track("https://www.youtube.com/watch?v=1".to_string())
            .unwrap();
        wait_until(|| manager.stats().active_downloads == 1).await;

        let second = manager
            .submit_track("https://www.youtube.com/watch?v=2".to_string())
            .unwrap();
        wait_until(|| {
            manager
                .get_job(&second)
                .is_some_and(|job| job.message == WAITING_FOR_SLOT)
        })
        .await;
        assert_eq!(manager.get_job(&second).unwrap().status, JobStatus::Starting);

        gate.add_permits(2);
        wait_until(|| {
            [&first, &second].iter().all(|id| {
                manager
                    .get_job(id)
                    .is_some_and(|job| job.status == JobStatus::Completed)
            })
        })
        .await;
        wait_until(|| manager.stats().active_downloads == 0).await;

        let stats = manager.stats();
        assert_eq!(stats.tracked_jobs, 2);
        assert_eq!(stats.max_concurrent_downloads, 1);
    }

    #[tokio::test]
    async fn test_missing_artifacts() {
        let dir = TempDir::new().unwrap();
        let manager = make_manager(&dir, 1, None, PlatformSettings::default());
        manager.init().await.unwrap();

        assert_eq!(
            manager.track_artifact("nope").await,
            Err(ArtifactError::TrackNotReady)
        );
        assert_eq!(
            manager.playlist_artifact("nope").await,
            Err(ArtifactError::PlaylistNotReady)
        );

        let job_id = manager
            .submit_track("https://www.youtube.com/watch?v=abc".to_string())
            .unwrap();
        wait_until(|| {
            manager
                .get_job(&job_id)
                .is_some_and(|job| job.status == JobStatus::Completed)
        })
        .await;
        let artifact = manager.track_artifact(&job_id).await.unwrap();
        std::fs::remove_file(&artifact.path).unwrap();
        assert_eq!(
            manager.track_artifact(&job_id).await,
            Err(ArtifactError::TrackFileMissing)
        );
    }

    #[tokio::test]
    async fn test_empty_playlist_fails() {
        let dir = TempDir::new().unwrap();
        let manager = make_manager(&dir, 1, None, PlatformSettings::default());
        manager.init().await.unwrap();

        let playlist_id = manager
            .submit_playlist("https://www.youtube.com/playlist?list=PL1".to_string())
            .unwrap();
        wait_until(|| {
            manager
                .get_playlist(&playlist_id)
                .is_some_and(|p| p.status.is_terminal())
        })
        .await;

        let playlist = manager.get_playlist(&playlist_id).unwrap();
        assert_eq!(playlist.status, PlaylistStatus::Error);
        assert_eq!(playlist.error.as_deref(), Some("No tracks found in playlist"));
    }
}
