//! Media extractor integration.
//!
//! The extractor resolves URLs into media metadata and performs the actual
//! transfer + transcode. The rest of the crate only talks to the
//! [`MediaExtractor`] trait; [`YtDlpExtractor`] is the production backend.

mod models;
mod ytdlp;

pub use models::*;
pub use ytdlp::{parse_progress_line, ExtractorOptions, YtDlpExtractor};

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;
use tokio::sync::mpsc;

/// Channel the extractor reports progress through.
///
/// Implementations must never block on it or fail because the receiving end
/// went away: reporting problems cannot be allowed to disturb a transfer.
pub type ProgressSender = mpsc::UnboundedSender<ProgressEvent>;
pub type ProgressReceiver = mpsc::UnboundedReceiver<ProgressEvent>;

#[derive(Debug, Error)]
pub enum ExtractorError {
    /// The extractor ran and reported a failure. Carries its raw error text.
    #[error("{0}")]
    Failed(String),

    #[error("Failed to run extractor: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid extractor output: {0}")]
    InvalidOutput(String),
}

#[async_trait]
pub trait MediaExtractor: Send + Sync {
    /// Metadata-only extraction of a single item, no data transfer.
    /// `Ok(None)` means the extractor produced no information.
    async fn extract_info(&self, url: &str) -> Result<Option<MediaInfo>, ExtractorError>;

    /// Shallow, non-recursive listing of a playlist's members.
    async fn extract_playlist(&self, url: &str) -> Result<Option<PlaylistInfo>, ExtractorError>;

    /// Transfers and transcodes `url` into `output_dir`, reporting through `progress`.
    async fn download(
        &self,
        url: &str,
        output_dir: &Path,
        progress: ProgressSender,
    ) -> Result<(), ExtractorError>;
}
