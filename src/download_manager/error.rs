//! Download failures and their user-facing classification.

use thiserror::Error;

use super::registry::RegistryError;
use crate::extractor::ExtractorError;

/// Errors that end a track or playlist job.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    UnsupportedPlatform(String),

    #[error("Could not extract video information")]
    ExtractionFailure,

    #[error("Could not find downloaded file")]
    NoOutputFile,

    #[error("No tracks found in playlist")]
    NoTracksFound,

    #[error("No tracks were successfully downloaded")]
    NoTracksDownloaded,

    #[error(transparent)]
    Extractor(#[from] ExtractorError),

    #[error("File operation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to create archive: {0}")]
    Archive(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl DownloadError {
    pub fn kind(&self) -> FailureKind {
        match self {
            DownloadError::ExtractionFailure => FailureKind::ExtractionFailure,
            _ => FailureKind::classify(&self.to_string()),
        }
    }

    /// Message stored on the failed job and shown to the user.
    pub fn user_message(&self) -> String {
        match self.kind() {
            FailureKind::Other => self.to_string(),
            kind => kind.user_message().to_string(),
        }
    }
}

impl From<zip::result::ZipError> for DownloadError {
    fn from(err: zip::result::ZipError) -> Self {
        DownloadError::Archive(err.to_string())
    }
}

/// Known failure families recognized in raw extractor error text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    AuthenticationRequired,
    ContentUnavailable,
    UnsupportedUrl,
    ExtractionFailure,
    Other,
}

impl FailureKind {
    /// Maps raw error text to a failure family by substring match.
    pub fn classify(raw: &str) -> Self {
        if raw.contains("Please sign in") || raw.contains("Sign in to confirm") {
            FailureKind::AuthenticationRequired
        } else if raw.contains("Video unavailable") {
            FailureKind::ContentUnavailable
        } else if raw.contains("Unsupported URL") {
            FailureKind::UnsupportedUrl
        } else if raw.contains("Failed to extract video information") {
            FailureKind::ExtractionFailure
        } else {
            FailureKind::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::AuthenticationRequired => "authentication_required",
            FailureKind::ContentUnavailable => "content_unavailable",
            FailureKind::UnsupportedUrl => "unsupported_url",
            FailureKind::ExtractionFailure => "extraction_failure",
            FailureKind::Other => "other",
        }
    }

    /// Friendly message for the family. `Other` has none and keeps the raw text.
    pub fn user_message(&self) -> &'static str {
        match self {
            FailureKind::AuthenticationRequired => {
                "This video requires authentication. Please try a different URL or a public video."
            }
            FailureKind::ContentUnavailable => {
                "This video is not available. It may be private, deleted, or region-restricted."
            }
            FailureKind::UnsupportedUrl => {
                "This platform is not supported. Please use YouTube, SoundCloud, or other supported platforms."
            }
            FailureKind::ExtractionFailure => {
                "Unable to extract video information. The URL may be invalid or the platform may not be supported."
            }
            FailureKind::Other => "",
        }
    }
}
