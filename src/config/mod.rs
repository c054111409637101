mod file_config;

pub use file_config::{DownloadConfig, FileConfig, PlatformsConfig};

use crate::extractor::ExtractorOptions;
use crate::server::RequestsLoggingLevel;
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;
use std::time::Duration;

/// Output formats whose file extension equals the format name.
pub const SUPPORTED_AUDIO_FORMATS: &[&str] = &["mp3", "m4a", "wav", "flac", "opus", "aac"];

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// When a finished artifact starts its deletion countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum CleanupTrigger {
    /// After the file has been served to a client.
    #[default]
    Retrieval,
    /// As soon as the job completes, whether or not it is ever fetched.
    Completion,
}

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub frontend_dir_path: Option<String>,
    pub download_dir: Option<PathBuf>,
    pub temp_dir: Option<PathBuf>,
    pub audio_format: String,
    pub audio_quality: String,
    pub cleanup_delay_secs: u64,
    pub cleanup_trigger: CleanupTrigger,
    pub max_concurrent_downloads: usize,
    pub timeout_sec: u64,
    pub proxy_url: Option<String>,
    pub ytdlp_path: Option<PathBuf>,
    pub embed_cover_art: bool,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            metrics_port: 9091,
            logging_level: RequestsLoggingLevel::default(),
            frontend_dir_path: None,
            download_dir: None,
            temp_dir: None,
            audio_format: "mp3".to_string(),
            audio_quality: "320".to_string(),
            cleanup_delay_secs: 300,
            cleanup_trigger: CleanupTrigger::default(),
            max_concurrent_downloads: 3,
            timeout_sec: 30,
            proxy_url: None,
            ytdlp_path: None,
            embed_cover_art: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub frontend_dir_path: Option<String>,

    // Feature configs (with defaults)
    pub download: DownloadSettings,
    pub platforms: PlatformSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let port = file.port.unwrap_or(cli.port);
        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let frontend_dir_path = file
            .frontend_dir_path
            .or_else(|| cli.frontend_dir_path.clone());

        let download_dir = file
            .download_dir
            .map(PathBuf::from)
            .or_else(|| cli.download_dir.clone())
            .unwrap_or_else(|| PathBuf::from("downloads"));
        let temp_dir = file
            .temp_dir
            .map(PathBuf::from)
            .or_else(|| cli.temp_dir.clone())
            .unwrap_or_else(std::env::temp_dir);

        if download_dir.exists() && !download_dir.is_dir() {
            bail!("download_dir is not a directory: {:?}", download_dir);
        }
        if temp_dir.exists() && !temp_dir.is_dir() {
            bail!("temp_dir is not a directory: {:?}", temp_dir);
        }

        // Download settings - merge file config with CLI values
        let dl_file = file.download.unwrap_or_default();

        let audio_format = dl_file
            .audio_format
            .unwrap_or_else(|| cli.audio_format.clone())
            .to_lowercase();
        if !SUPPORTED_AUDIO_FORMATS.contains(&audio_format.as_str()) {
            bail!(
                "Unsupported audio format '{}', expected one of: {}",
                audio_format,
                SUPPORTED_AUDIO_FORMATS.join(", ")
            );
        }

        let audio_quality = dl_file
            .audio_quality
            .unwrap_or_else(|| cli.audio_quality.clone());
        match audio_quality.parse::<u32>() {
            Ok(kbps) if kbps > 0 => {}
            _ => bail!(
                "Invalid audio quality '{}', expected a bitrate in kbps",
                audio_quality
            ),
        }

        let cleanup_trigger = match dl_file.cleanup_trigger {
            Some(s) => match CleanupTrigger::from_str(&s, true) {
                Ok(trigger) => trigger,
                Err(_) => bail!(
                    "Invalid cleanup_trigger '{}', expected 'retrieval' or 'completion'",
                    s
                ),
            },
            None => cli.cleanup_trigger,
        };

        let max_concurrent_downloads = dl_file
            .max_concurrent_downloads
            .unwrap_or(cli.max_concurrent_downloads);
        if max_concurrent_downloads == 0 {
            bail!("max_concurrent_downloads must be at least 1");
        }

        let download = DownloadSettings {
            download_dir,
            temp_dir,
            audio_format,
            audio_quality,
            cleanup_delay_secs: dl_file
                .cleanup_delay_secs
                .unwrap_or(cli.cleanup_delay_secs),
            cleanup_trigger,
            max_concurrent_downloads,
            timeout_sec: dl_file.timeout_sec.unwrap_or(cli.timeout_sec),
            user_agent: dl_file
                .user_agent
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            proxy_url: dl_file.proxy_url.or_else(|| cli.proxy_url.clone()),
            retries: dl_file.retries.unwrap_or(3),
            fragment_retries: dl_file.fragment_retries.unwrap_or(3),
            ytdlp_path: dl_file
                .ytdlp_path
                .map(PathBuf::from)
                .or_else(|| cli.ytdlp_path.clone())
                .unwrap_or_else(|| PathBuf::from("yt-dlp")),
            embed_cover_art: dl_file.embed_cover_art.unwrap_or(cli.embed_cover_art),
        };

        let pl_file = file.platforms.unwrap_or_default();
        let platforms = PlatformSettings {
            youtube: pl_file.youtube.unwrap_or(true),
            youtube_music: pl_file.youtube_music.unwrap_or(true),
            soundcloud: pl_file.soundcloud.unwrap_or(true),
            bandcamp: pl_file.bandcamp.unwrap_or(true),
            vimeo: pl_file.vimeo.unwrap_or(true),
            dailymotion: pl_file.dailymotion.unwrap_or(true),
        };

        Ok(Self {
            port,
            metrics_port,
            logging_level,
            frontend_dir_path,
            download,
            platforms,
        })
    }
}

#[derive(Debug, Clone)]
pub struct DownloadSettings {
    pub download_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub audio_format: String,
    pub audio_quality: String,
    pub cleanup_delay_secs: u64,
    pub cleanup_trigger: CleanupTrigger,
    pub max_concurrent_downloads: usize,
    /// Socket timeout handed to the extractor.
    pub timeout_sec: u64,
    pub user_agent: String,
    pub proxy_url: Option<String>,
    pub retries: u32,
    pub fragment_retries: u32,
    pub ytdlp_path: PathBuf,
    pub embed_cover_art: bool,
}

impl DownloadSettings {
    pub fn cleanup_delay(&self) -> Duration {
        Duration::from_secs(self.cleanup_delay_secs)
    }

    pub fn extractor_options(&self) -> ExtractorOptions {
        ExtractorOptions {
            binary: self.ytdlp_path.clone(),
            audio_format: self.audio_format.clone(),
            audio_quality: self.audio_quality.clone(),
            socket_timeout_secs: self.timeout_sec,
            user_agent: self.user_agent.clone(),
            proxy_url: self.proxy_url.clone(),
            retries: self.retries,
            fragment_retries: self.fragment_retries,
        }
    }
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("downloads"),
            temp_dir: std::env::temp_dir(),
            audio_format: "mp3".to_string(),
            audio_quality: "320".to_string(),
            cleanup_delay_secs: 300, // 5 minutes
            cleanup_trigger: CleanupTrigger::Retrieval,
            max_concurrent_downloads: 3,
            timeout_sec: 30,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            proxy_url: None,
            retries: 3,
            fragment_retries: 3,
            ytdlp_path: PathBuf::from("yt-dlp"),
            embed_cover_art: false,
        }
    }
}

/// Per-platform enable flags. Unknown platforms are not covered here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformSettings {
    pub youtube: bool,
    pub youtube_music: bool,
    pub soundcloud: bool,
    pub bandcamp: bool,
    pub vimeo: bool,
    pub dailymotion: bool,
}

impl Default for PlatformSettings {
    fn default() -> Self {
        Self {
            youtube: true,
            youtube_music: true,
            soundcloud: true,
            bandcamp: true,
            vimeo: true,
            dailymotion: true,
        }
    }
}

/// Parses a logging level string into RequestsLoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}
