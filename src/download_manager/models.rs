//! Data models for the download manager.
//!
//! Defines track jobs, playlist jobs, their statuses and the per-track
//! snapshots a playlist keeps for its members.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Status of a single-track job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Starting,
    Extracting,
    Downloading,
    Processing,
    Completed, // terminal
    Error,     // terminal
}

impl JobStatus {
    /// Returns true if this is a terminal state (Completed or Error).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Starting => "starting",
            JobStatus::Extracting => "extracting",
            JobStatus::Downloading => "downloading",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
        }
    }
}

/// Status of a playlist job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaylistStatus {
    Starting,
    Downloading,
    Completed, // terminal
    Error,     // terminal
}

impl PlaylistStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PlaylistStatus::Completed | PlaylistStatus::Error)
    }
}

/// Link from a track job to the playlist that spawned it.
///
/// Used only to look the parent up in the registry, the track does not own it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistRef {
    pub playlist_id: String,
    pub track_index: usize,
}

impl PlaylistRef {
    pub fn new(playlist_id: impl Into<String>, track_index: usize) -> Self {
        Self {
            playlist_id: playlist_id.into(),
            track_index,
        }
    }

    /// Identifier of the child job for this playlist position.
    pub fn track_job_id(&self) -> String {
        format!("{}_track_{}", self.playlist_id, self.track_index)
    }

    /// Title shown for the track until the extractor reports a real one.
    pub fn placeholder_title(&self) -> String {
        format!("Track {}", self.track_index + 1)
    }
}

/// A single-track download job, as stored in the registry and served to pollers.
#[derive(Debug, Clone, Serialize)]
pub struct TrackJob {
    pub id: String,
    pub status: JobStatus,
    pub percentage: f64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downloaded_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_bytes: Option<u64>,
    /// Transfer rate in bytes per second.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Estimated seconds remaining.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playlist_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_index: Option<usize>,
}

impl TrackJob {
    pub fn new(id: impl Into<String>, parent: Option<&PlaylistRef>) -> Self {
        Self {
            id: id.into(),
            status: JobStatus::Starting,
            percentage: 0.0,
            message: "Initializing download...".to_string(),
            downloaded_bytes: None,
            total_bytes: None,
            speed: None,
            eta: None,
            file_path: None,
            filename: None,
            title: None,
            artist: None,
            error: None,
            playlist_id: parent.map(|p| p.playlist_id.clone()),
            track_index: parent.map(|p| p.track_index),
        }
    }

    pub fn parent(&self) -> Option<PlaylistRef> {
        match (&self.playlist_id, self.track_index) {
            (Some(playlist_id), Some(track_index)) => {
                Some(PlaylistRef::new(playlist_id.clone(), track_index))
            }
            _ => None,
        }
    }

    /// Marks the job completed. Status, percentage and outputs change together.
    pub fn complete(
        &mut self,
        file_path: PathBuf,
        filename: String,
        title: String,
        artist: String,
    ) {
        self.status = JobStatus::Completed;
        self.percentage = 100.0;
        self.file_path = Some(file_path);
        self.filename = Some(filename);
        self.title = Some(title);
        self.artist = Some(artist);
        self.error = None;
        self.message = "Download completed!".to_string();
    }

    /// Marks the job failed with an already user-facing message.
    pub fn fail(&mut self, error_message: &str) {
        self.status = JobStatus::Error;
        self.percentage = 0.0;
        self.error = Some(error_message.to_string());
        self.message = format!("Download failed: {}", error_message);
    }
}

/// Lightweight progress snapshot of one playlist member.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackSnapshot {
    pub status: JobStatus,
    pub percentage: f64,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TrackSnapshot {
    pub fn new(status: JobStatus, percentage: f64, title: impl Into<String>) -> Self {
        Self {
            status,
            percentage,
            title: title.into(),
            error: None,
        }
    }

    pub fn failed(title: impl Into<String>, error_message: &str) -> Self {
        Self {
            status: JobStatus::Error,
            percentage: 0.0,
            title: title.into(),
            error: Some(error_message.to_string()),
        }
    }
}

/// A playlist download job aggregating many track jobs into one archive.
#[derive(Debug, Clone, Serialize)]
pub struct PlaylistJob {
    pub id: String,
    pub status: PlaylistStatus,
    pub overall_percentage: f64,
    pub total_tracks: usize,
    pub completed_tracks: usize,
    pub tracks: BTreeMap<usize, TrackSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playlist_title: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zip_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zip_filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PlaylistJob {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: PlaylistStatus::Starting,
            overall_percentage: 0.0,
            total_tracks: 0,
            completed_tracks: 0,
            tracks: BTreeMap::new(),
            playlist_title: None,
            message: "Extracting playlist information...".to_string(),
            zip_path: None,
            zip_filename: None,
            error: None,
        }
    }

    /// Recomputes the overall percentage from the track counters.
    pub fn recompute_percentage(&mut self) {
        self.overall_percentage = if self.total_tracks == 0 {
            0.0
        } else {
            self.completed_tracks as f64 / self.total_tracks as f64 * 100.0
        };
    }

    pub fn complete(&mut self, zip_path: PathBuf, zip_filename: String, downloaded: usize) {
        self.status = PlaylistStatus::Completed;
        self.overall_percentage = 100.0;
        self.zip_path = Some(zip_path);
        self.zip_filename = Some(zip_filename);
        self.error = None;
        self.message = format!(
            "Playlist download completed! {} tracks downloaded.",
            downloaded
        );
    }

    pub fn fail(&mut self, error_message: &str) {
        self.status = PlaylistStatus::Error;
        self.overall_percentage = 0.0;
        self.error = Some(error_message.to_string());
        self.message = format!("Playlist download failed: {}", error_message);
    }
}
