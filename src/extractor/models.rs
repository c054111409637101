//! Data models exchanged with the media extractor.

use serde::Deserialize;

pub const UNKNOWN_TITLE: &str = "Unknown Title";
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";
pub const UNKNOWN_PLAYLIST: &str = "Unknown Playlist";

/// Metadata of a single media item, as returned by a metadata-only extraction.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub uploader: Option<String>,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    /// Duration in seconds.
    #[serde(default)]
    pub duration: Option<f64>,
}

impl MediaInfo {
    pub fn display_title(&self) -> String {
        non_empty(&self.title).unwrap_or_else(|| UNKNOWN_TITLE.to_string())
    }

    pub fn display_artist(&self) -> String {
        non_empty(&self.uploader)
            .or_else(|| non_empty(&self.artist))
            .unwrap_or_else(|| UNKNOWN_ARTIST.to_string())
    }
}

/// Shallow listing of a playlist.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlaylistInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    /// `None` when the extractor did not recognize the URL as a playlist.
    /// Individual entries can be null for unavailable members.
    #[serde(default)]
    pub entries: Option<Vec<Option<PlaylistEntry>>>,
}

impl PlaylistInfo {
    pub fn display_title(&self) -> String {
        non_empty(&self.title).unwrap_or_else(|| UNKNOWN_PLAYLIST.to_string())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlaylistEntry {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub webpage_url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

impl PlaylistEntry {
    /// URL to download this member from.
    ///
    /// Falls back to a YouTube watch URL built from the entry id when the
    /// listing carries no direct URL.
    pub fn track_url(&self) -> Option<String> {
        non_empty(&self.url)
            .or_else(|| non_empty(&self.webpage_url))
            .or_else(|| {
                non_empty(&self.id).map(|id| format!("https://www.youtube.com/watch?v={}", id))
            })
    }
}

/// One progress tick emitted by the extractor while it works.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Downloading {
        downloaded_bytes: u64,
        total_bytes: Option<u64>,
        total_bytes_estimate: Option<u64>,
        /// Bytes per second.
        speed: Option<f64>,
        /// Seconds remaining.
        eta: Option<u64>,
        title: Option<String>,
    },
    /// Raw transfer is done, post-processing is about to start.
    Finished { title: Option<String> },
    Error { message: String },
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_ref()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}
