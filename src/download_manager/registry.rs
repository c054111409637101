//! In-memory registry of track and playlist jobs.
//!
//! The registry is the single source of truth shared by background runners
//! (writers) and HTTP pollers (readers). Every write replaces or merges one
//! whole record under the lock, so readers never see a partially updated job.
//! Locks are never held across an await point.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use thiserror::Error;
use tracing::debug;

use super::models::{PlaylistJob, TrackJob, TrackSnapshot};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Job already exists: {0}")]
    DuplicateId(String),

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Job {0} already reached a terminal state")]
    Finalized(String),
}

#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<String, TrackJob>>,
    playlists: RwLock<HashMap<String, PlaylistJob>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Track jobs
    // =========================================================================

    /// Registers a new track job. Fails if the id is already taken.
    pub fn create_job(&self, job: TrackJob) -> Result<(), RegistryError> {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        if jobs.contains_key(&job.id) {
            return Err(RegistryError::DuplicateId(job.id));
        }
        jobs.insert(job.id.clone(), job);
        Ok(())
    }

    /// Applies `update` to the job atomically.
    ///
    /// Terminal jobs are left untouched and `Finalized` is returned.
    pub fn update_job<F>(&self, id: &str, update: F) -> Result<(), RegistryError>
    where
        F: FnOnce(&mut TrackJob),
    {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        if job.status.is_terminal() {
            debug!("Ignoring update to finalized job {}", id);
            return Err(RegistryError::Finalized(id.to_string()));
        }
        update(job);
        Ok(())
    }

    pub fn get_job(&self, id: &str) -> Option<TrackJob> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn job_count(&self) -> usize {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    // =========================================================================
    // Playlist jobs
    // =========================================================================

    pub fn create_playlist(&self, playlist: PlaylistJob) -> Result<(), RegistryError> {
        let mut playlists = self
            .playlists
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if playlists.contains_key(&playlist.id) {
            return Err(RegistryError::DuplicateId(playlist.id));
        }
        playlists.insert(playlist.id.clone(), playlist);
        Ok(())
    }

    pub fn update_playlist<F>(&self, id: &str, update: F) -> Result<(), RegistryError>
    where
        F: FnOnce(&mut PlaylistJob),
    {
        let mut playlists = self
            .playlists
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let playlist = playlists
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        if playlist.status.is_terminal() {
            debug!("Ignoring update to finalized playlist {}", id);
            return Err(RegistryError::Finalized(id.to_string()));
        }
        update(playlist);
        Ok(())
    }

    /// Writes the snapshot for one member of a playlist.
    pub fn set_track_snapshot(
        &self,
        playlist_id: &str,
        track_index: usize,
        snapshot: TrackSnapshot,
    ) -> Result<(), RegistryError> {
        self.update_playlist(playlist_id, |playlist| {
            playlist.tracks.insert(track_index, snapshot);
        })
    }

    pub fn get_playlist(&self, id: &str) -> Option<PlaylistJob> {
        self.playlists
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn playlist_count(&self) -> usize {
        self.playlists
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
