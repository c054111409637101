//! Scripted collaborators for end-to-end tests
//!
//! The extractor answers from a fixed table keyed by URL, so tests never
//! touch the network or need the real extractor binary installed.

use super::constants::*;
use async_trait::async_trait;
use audio_fetcher::extractor::{
    ExtractorError, MediaExtractor, MediaInfo, PlaylistEntry, PlaylistInfo, ProgressEvent,
    ProgressSender,
};
use audio_fetcher::tagger::{AudioTagger, TaggerError, TrackTags};
use std::path::Path;

const UNAVAILABLE_ERROR: &str = "ERROR: [youtube] fixture-gone: Video unavailable";

fn title_for(url: &str) -> Result<&'static str, ExtractorError> {
    match url {
        SINGLE_TRACK_URL => Ok(SINGLE_TRACK_TITLE),
        u if u == PLAYLIST_TRACK_URLS[0] => Ok(FIRST_TRACK_TITLE),
        u if u == PLAYLIST_TRACK_URLS[2] => Ok(THIRD_TRACK_TITLE),
        UNAVAILABLE_TRACK_URL => Err(ExtractorError::Failed(UNAVAILABLE_ERROR.to_string())),
        other => Err(ExtractorError::Failed(format!(
            "ERROR: Unsupported URL: {}",
            other
        ))),
    }
}

/// Extractor that serves the fixture table
pub struct ScriptedExtractor;

#[async_trait]
impl MediaExtractor for ScriptedExtractor {
    async fn extract_info(&self, url: &str) -> Result<Option<MediaInfo>, ExtractorError> {
        let title = title_for(url)?;
        Ok(Some(MediaInfo {
            title: Some(title.to_string()),
            uploader: Some(FIXTURE_ARTIST.to_string()),
            ..Default::default()
        }))
    }

    async fn extract_playlist(&self, url: &str) -> Result<Option<PlaylistInfo>, ExtractorError> {
        let entries = match url {
            PLAYLIST_URL => PLAYLIST_TRACK_URLS
                .iter()
                .map(|u| {
                    Some(PlaylistEntry {
                        url: Some(u.to_string()),
                        ..Default::default()
                    })
                })
                .collect(),
            EMPTY_PLAYLIST_URL => Vec::new(),
            other => {
                return Err(ExtractorError::Failed(format!(
                    "ERROR: Unsupported URL: {}",
                    other
                )))
            }
        };
        Ok(Some(PlaylistInfo {
            title: Some(FIXTURE_PLAYLIST_TITLE.to_string()),
            entries: Some(entries),
            ..Default::default()
        }))
    }

    async fn download(
        &self,
        url: &str,
        output_dir: &Path,
        progress: ProgressSender,
    ) -> Result<(), ExtractorError> {
        let title = title_for(url)?;
        let total = FIXTURE_AUDIO_BYTES.len() as u64;
        for downloaded in [total / 2, total] {
            let _ = progress.send(ProgressEvent::Downloading {
                downloaded_bytes: downloaded,
                total_bytes: Some(total),
                total_bytes_estimate: None,
                speed: Some(1024.0),
                eta: Some(0),
                title: Some(title.to_string()),
            });
        }
        tokio::fs::write(output_dir.join(format!("{}.mp3", title)), FIXTURE_AUDIO_BYTES).await?;
        let _ = progress.send(ProgressEvent::Finished {
            title: Some(title.to_string()),
        });
        Ok(())
    }
}

/// Tagger that accepts every file without touching it
pub struct NoopTagger;

#[async_trait]
impl AudioTagger for NoopTagger {
    async fn write_tags(&self, _path: &Path, _tags: &TrackTags) -> Result<(), TaggerError> {
        Ok(())
    }
}
