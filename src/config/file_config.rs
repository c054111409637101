use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub port: Option<u16>,
    pub metrics_port: Option<u16>,
    pub logging_level: Option<String>,
    pub frontend_dir_path: Option<String>,
    pub download_dir: Option<String>,
    pub temp_dir: Option<String>,

    // Feature configs
    pub download: Option<DownloadConfig>,
    pub platforms: Option<PlatformsConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct DownloadConfig {
    pub audio_format: Option<String>,
    /// Target bitrate in kbps, e.g. "320".
    pub audio_quality: Option<String>,
    pub cleanup_delay_secs: Option<u64>,
    /// "retrieval" or "completion"
    pub cleanup_trigger: Option<String>,
    pub max_concurrent_downloads: Option<usize>,
    pub timeout_sec: Option<u64>,
    pub user_agent: Option<String>,
    pub proxy_url: Option<String>,
    pub retries: Option<u32>,
    pub fragment_retries: Option<u32>,
    pub ytdlp_path: Option<String>,
    pub embed_cover_art: Option<bool>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct PlatformsConfig {
    pub youtube: Option<bool>,
    pub youtube_music: Option<bool>,
    pub soundcloud: Option<bool>,
    pub bandcamp: Option<bool>,
    pub vimeo: Option<bool>,
    pub dailymotion: Option<bool>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
