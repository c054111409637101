//! URL validation and platform classification.

use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Url;
use thiserror::Error;

use crate::config::PlatformSettings;

lazy_static! {
    static ref URL_PATTERN: Regex = Regex::new(
        r"(?i)^https?://(?:(?:[A-Z0-9](?:[A-Z0-9-]{0,61}[A-Z0-9])?\.)+(?:[A-Z]{2,6}\.?|[A-Z0-9-]{2,}\.?)|localhost|\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3})(?::\d+)?(?:/?|[/?]\S+)$"
    )
    .expect("URL pattern must compile");
}

const PLAYLIST_INDICATORS: &[&str] = &["playlist", "album", "list=", "sets/", "/artist/"];

const DRM_ALTERNATIVE: &str = "Try finding the same song on YouTube or SoundCloud";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    YouTube,
    YouTubeMusic,
    SoundCloud,
    Bandcamp,
    Vimeo,
    Dailymotion,
    AppleMusic,
    Spotify,
    AmazonMusic,
    Tidal,
    Deezer,
    Unknown,
}

/// Known domains. A host matches an entry exactly or as a subdomain of it.
const DOMAINS: &[(&str, Platform)] = &[
    ("youtube.com", Platform::YouTube),
    ("youtu.be", Platform::YouTube),
    ("music.youtube.com", Platform::YouTubeMusic),
    ("soundcloud.com", Platform::SoundCloud),
    ("bandcamp.com", Platform::Bandcamp),
    ("vimeo.com", Platform::Vimeo),
    ("dailymotion.com", Platform::Dailymotion),
    ("music.apple.com", Platform::AppleMusic),
    ("open.spotify.com", Platform::Spotify),
    ("music.amazon.com", Platform::AmazonMusic),
    ("tidal.com", Platform::Tidal),
    ("deezer.com", Platform::Deezer),
];

impl Platform {
    pub fn name(&self) -> &'static str {
        match self {
            Platform::YouTube => "YouTube",
            Platform::YouTubeMusic => "YouTube Music",
            Platform::SoundCloud => "SoundCloud",
            Platform::Bandcamp => "Bandcamp",
            Platform::Vimeo => "Vimeo",
            Platform::Dailymotion => "Dailymotion",
            Platform::AppleMusic => "Apple Music",
            Platform::Spotify => "Spotify",
            Platform::AmazonMusic => "Amazon Music",
            Platform::Tidal => "Tidal",
            Platform::Deezer => "Deezer",
            Platform::Unknown => "Unknown Platform",
        }
    }

    pub fn notes(&self) -> &'static str {
        match self {
            Platform::YouTube => "Fully supported",
            Platform::YouTubeMusic => "May require sign-in for some content",
            Platform::SoundCloud => "Fully supported for public tracks",
            Platform::Bandcamp => "Supported for free tracks",
            Platform::Vimeo | Platform::Dailymotion => "Supported for public videos",
            Platform::AppleMusic
            | Platform::Spotify
            | Platform::AmazonMusic
            | Platform::Tidal
            | Platform::Deezer => "Not supported due to DRM protection",
            Platform::Unknown => "Platform not recognized, attempting download",
        }
    }

    pub fn is_drm_protected(&self) -> bool {
        matches!(
            self,
            Platform::AppleMusic
                | Platform::Spotify
                | Platform::AmazonMusic
                | Platform::Tidal
                | Platform::Deezer
        )
    }

    /// Enable flag for this platform. Unknown platforms are always allowed.
    fn is_enabled(&self, settings: &PlatformSettings) -> bool {
        match self {
            Platform::YouTube => settings.youtube,
            Platform::YouTubeMusic => settings.youtube_music,
            Platform::SoundCloud => settings.soundcloud,
            Platform::Bandcamp => settings.bandcamp,
            Platform::Vimeo => settings.vimeo,
            Platform::Dailymotion => settings.dailymotion,
            Platform::Unknown => true,
            _ => false,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlatformRejection {
    #[error("Invalid URL format")]
    InvalidUrl,

    #[error("{} is not supported. {}. {}", .0.name(), .0.notes(), DRM_ALTERNATIVE)]
    DrmProtected(Platform),

    #[error("{} downloads are disabled on this server", .0.name())]
    Disabled(Platform),
}

/// Basic shape check: http(s) scheme, a domain, localhost or IPv4 host, optional port.
pub fn validate_url(url: &str) -> bool {
    URL_PATTERN.is_match(url)
}

/// Classifies `url` by its host. Hosts not in the table are `Unknown`.
pub fn detect_platform(url: &str) -> Platform {
    let Some(host) = Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
    else {
        return Platform::Unknown;
    };
    let host = host.strip_prefix("www.").unwrap_or(&host);

    DOMAINS
        .iter()
        .filter(|(domain, _)| {
            host == *domain
                || host
                    .strip_suffix(domain)
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
        // Most specific domain wins, so music.youtube.com beats youtube.com.
        .max_by_key(|(domain, _)| domain.len())
        .map(|(_, platform)| *platform)
        .unwrap_or(Platform::Unknown)
}

/// Heuristic playlist detection on the raw URL text.
pub fn is_playlist_url(url: &str) -> bool {
    let lower = url.to_lowercase();
    PLAYLIST_INDICATORS
        .iter()
        .any(|indicator| lower.contains(indicator))
}

/// Decides whether a URL may be submitted, given the per-platform flags.
#[derive(Debug, Clone, Default)]
pub struct PlatformPolicy {
    settings: PlatformSettings,
}

impl PlatformPolicy {
    pub fn new(settings: PlatformSettings) -> Self {
        Self { settings }
    }

    pub fn check(&self, url: &str) -> Result<Platform, PlatformRejection> {
        if !validate_url(url) {
            return Err(PlatformRejection::InvalidUrl);
        }
        let platform = detect_platform(url);
        if platform.is_drm_protected() {
            return Err(PlatformRejection::DrmProtected(platform));
        }
        if !platform.is_enabled(&self.settings) {
            return Err(PlatformRejection::Disabled(platform));
        }
        Ok(platform)
    }
}
