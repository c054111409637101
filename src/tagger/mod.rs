//! Audio tag writing.
//!
//! Tagging is best effort: callers log a [`TaggerError`] and carry on.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use lofty::config::WriteOptions;
use lofty::error::LoftyError;
use lofty::picture::{MimeType, Picture, PictureType};
use lofty::prelude::*;
use lofty::probe::Probe;
use lofty::tag::Tag;
use thiserror::Error;
use tracing::{debug, warn};

const COVER_FETCH_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum TaggerError {
    #[error("Tag error: {0}")]
    Lofty(#[from] LoftyError),

    #[error("File has no writable tag: {0}")]
    NoWritableTag(PathBuf),

    #[error("Tagging task failed: {0}")]
    Task(String),
}

/// Metadata written into a finished track.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackTags {
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    /// Remote image used as front cover when cover embedding is enabled.
    pub cover_url: Option<String>,
}

#[async_trait]
pub trait AudioTagger: Send + Sync {
    async fn write_tags(&self, path: &Path, tags: &TrackTags) -> Result<(), TaggerError>;
}

/// Writes tags with lofty, optionally embedding a downloaded front cover.
pub struct LoftyTagger {
    http: reqwest::Client,
    embed_cover_art: bool,
}

impl LoftyTagger {
    pub fn new(embed_cover_art: bool) -> Self {
        let http = reqwest::Client::builder()
            .timeout(COVER_FETCH_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            http,
            embed_cover_art,
        }
    }

    /// Downloads the cover image. Any failure just means no cover.
    async fn fetch_cover(&self, url: &str) -> Option<Vec<u8>> {
        let response = match self.http.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("Failed to fetch cover art from {}: {}", url, e);
                return None;
            }
        };
        if !response.status().is_success() {
            warn!("Cover art request to {} returned {}", url, response.status());
            return None;
        }
        match response.bytes().await {
            Ok(bytes) => Some(bytes.to_vec()),
            Err(e) => {
                warn!("Failed to read cover art from {}: {}", url, e);
                None
            }
        }
    }
}

#[async_trait]
impl AudioTagger for LoftyTagger {
    async fn write_tags(&self, path: &Path, tags: &TrackTags) -> Result<(), TaggerError> {
        let cover = match (&tags.cover_url, self.embed_cover_art) {
            (Some(url), true) => self.fetch_cover(url).await,
            _ => None,
        };

        let path = path.to_path_buf();
        let tags = tags.clone();
        tokio::task::spawn_blocking(move || write_tags_blocking(&path, &tags, cover))
            .await
            .map_err(|e| TaggerError::Task(e.to_string()))?
    }
}

fn write_tags_blocking(
    path: &Path,
    tags: &TrackTags,
    cover: Option<Vec<u8>>,
) -> Result<(), TaggerError> {
    let mut tagged_file = Probe::open(path)?.read()?;

    if tagged_file.primary_tag().is_none() {
        let tag_type = tagged_file.primary_tag_type();
        tagged_file.insert_tag(Tag::new(tag_type));
    }
    let tag = tagged_file
        .primary_tag_mut()
        .ok_or_else(|| TaggerError::NoWritableTag(path.to_path_buf()))?;

    tag.set_title(tags.title.clone());
    tag.set_artist(tags.artist.clone());
    if let Some(album) = &tags.album {
        tag.set_album(album.clone());
    }

    if let Some(data) = cover {
        match cover_mime_type(&data) {
            Some(mime) => {
                tag.remove_picture_type(PictureType::CoverFront);
                tag.push_picture(Picture::new_unchecked(
                    PictureType::CoverFront,
                    Some(mime),
                    None,
                    data,
                ));
            }
            None => warn!("Ignoring cover art in an unknown image format"),
        }
    }

    tagged_file.save_to_path(path, WriteOptions::default())?;
    debug!("Wrote tags to {}", path.display());
    Ok(())
}

/// MIME type of an image payload, `None` when the bytes are not an image.
fn cover_mime_type(data: &[u8]) -> Option<MimeType> {
    let kind = infer::get(data)?;
    let mime = kind.mime_type();
    if !mime.starts_with("image/") {
        return None;
    }
    Some(match mime {
        "image/jpeg" => MimeType::Jpeg,
        "image/png" => MimeType::Png,
        "image/gif" => MimeType::Gif,
        "image/bmp" => MimeType::Bmp,
        "image/tiff" => MimeType::Tiff,
        other => MimeType::Unknown(other.to_string()),
    })
}
