//! Track and playlist download jobs: registry, runners and file lifecycle.

mod cleanup;
mod error;
mod manager;
mod models;
mod playlist_runner;
mod progress;
mod registry;
mod storage;
mod track_runner;

pub use cleanup::CleanupScheduler;
pub use error::{DownloadError, FailureKind};
pub use manager::{Artifact, ArtifactError, DownloadManager, ManagerStats};
pub use models::{JobStatus, PlaylistJob, PlaylistRef, PlaylistStatus, TrackJob, TrackSnapshot};
pub use registry::{JobRegistry, RegistryError};
pub use storage::FileStore;
