//! Download HTTP routes.
//!
//! Provides endpoints for:
//! - Submitting single-track and playlist downloads
//! - Polling job and playlist progress
//! - Fetching finished files and playlist archives

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::{debug, error, warn};

use crate::download_manager::{Artifact, ArtifactError, DownloadManager};
use crate::platform::is_playlist_url;
use crate::server::state::{GuardedDownloadManager, ServerState};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct DownloadBody {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DownloadStartedResponse {
    pub download_id: String,
    pub message: String,
    pub platform: String,
    pub platform_notes: String,
}

#[derive(Debug, Serialize)]
pub struct PlaylistStartedResponse {
    pub playlist_id: String,
    pub message: String,
    pub platform: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_playlist: Option<bool>,
}

impl ErrorResponse {
    fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            is_playlist: None,
        }
    }

    fn playlist_mismatch(error: &str, is_playlist: bool) -> Self {
        Self {
            error: error.to_string(),
            is_playlist: Some(is_playlist),
        }
    }
}

const USE_PLAYLIST_BUTTON: &str =
    "This appears to be a playlist URL. Please use the \"Download Playlist\" button instead.";
const USE_SINGLE_BUTTON: &str =
    "This does not appear to be a playlist URL. Please use the \"Download Single\" button instead.";

fn bad_request(body: ErrorResponse) -> Response {
    (StatusCode::BAD_REQUEST, Json(body)).into_response()
}

// =============================================================================
// Submission
// =============================================================================

/// POST /download - Start a single-track download
async fn start_download(
    State(manager): State<GuardedDownloadManager>,
    Json(body): Json<DownloadBody>,
) -> Response {
    let raw = body.url.unwrap_or_default();
    let (url, platform) = match manager.validate(&raw) {
        Ok(validated) => validated,
        Err(e) => {
            debug!("Rejected download request: {}", e);
            return bad_request(ErrorResponse::new(e.to_string()));
        }
    };
    if is_playlist_url(&url) {
        return bad_request(ErrorResponse::playlist_mismatch(USE_PLAYLIST_BUTTON, true));
    }

    match manager.submit_track(url) {
        Ok(download_id) => Json(DownloadStartedResponse {
            download_id,
            message: format!("Download started from {}", platform.name()),
            platform: platform.name().to_string(),
            platform_notes: platform.notes().to_string(),
        })
        .into_response(),
        Err(e) => {
            error!("Failed to register download: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(e.to_string())),
            )
                .into_response()
        }
    }
}

/// POST /download_playlist - Start a playlist download
async fn start_playlist_download(
    State(manager): State<GuardedDownloadManager>,
    Json(body): Json<DownloadBody>,
) -> Response {
    let raw = body.url.unwrap_or_default();
    let (url, platform) = match manager.validate(&raw) {
        Ok(validated) => validated,
        Err(e) => {
            debug!("Rejected playlist request: {}", e);
            return bad_request(ErrorResponse::new(e.to_string()));
        }
    };
    if !is_playlist_url(&url) {
        return bad_request(ErrorResponse::playlist_mismatch(USE_SINGLE_BUTTON, false));
    }

    match manager.submit_playlist(url) {
        Ok(playlist_id) => Json(PlaylistStartedResponse {
            playlist_id,
            message: "Playlist download started".to_string(),
            platform: platform.name().to_string(),
        })
        .into_response(),
        Err(e) => {
            error!("Failed to register playlist download: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(e.to_string())),
            )
                .into_response()
        }
    }
}

// =============================================================================
// Progress
// =============================================================================

/// GET /progress/{id}
async fn get_progress(
    State(manager): State<GuardedDownloadManager>,
    Path(job_id): Path<String>,
) -> Response {
    match manager.get_job(&job_id) {
        Some(job) => Json(job).into_response(),
        None => Json(json!({
            "status": "not_found",
            "percentage": 0,
            "message": "Download not found",
        }))
        .into_response(),
    }
}

/// GET /playlist_progress/{id}
async fn get_playlist_progress(
    State(manager): State<GuardedDownloadManager>,
    Path(playlist_id): Path<String>,
) -> Response {
    match manager.get_playlist(&playlist_id) {
        Some(playlist) => Json(playlist).into_response(),
        None => Json(json!({
            "status": "not_found",
            "overall_percentage": 0,
            "message": "Playlist not found",
        }))
        .into_response(),
    }
}

// =============================================================================
// Retrieval
// =============================================================================

/// GET /download_file/{id}
async fn download_file(
    State(manager): State<GuardedDownloadManager>,
    Path(job_id): Path<String>,
) -> Response {
    let artifact = manager.track_artifact(&job_id).await;
    serve_artifact(&manager, artifact, ArtifactError::TrackFileMissing).await
}

/// GET /download_playlist/{id}
async fn download_playlist_archive(
    State(manager): State<GuardedDownloadManager>,
    Path(playlist_id): Path<String>,
) -> Response {
    let artifact = manager.playlist_artifact(&playlist_id).await;
    serve_artifact(&manager, artifact, ArtifactError::ArchiveMissing).await
}

async fn serve_artifact(
    manager: &DownloadManager,
    artifact: Result<Artifact, ArtifactError>,
    missing: ArtifactError,
) -> Response {
    let not_found =
        |e: ArtifactError| (StatusCode::NOT_FOUND, Json(ErrorResponse::new(e.to_string())));

    let artifact = match artifact {
        Ok(artifact) => artifact,
        Err(e) => return not_found(e).into_response(),
    };
    let file = match File::open(&artifact.path).await {
        Ok(file) => file,
        Err(e) => {
            warn!("Could not open {:?}: {}", artifact.path, e);
            return not_found(missing).into_response();
        }
    };
    let length = file.metadata().await.ok().map(|m| m.len());

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type_for(&artifact.filename))
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition(&artifact.filename),
        );
    if let Some(length) = length {
        builder = builder.header(header::CONTENT_LENGTH, length);
    }

    match builder.body(Body::from_stream(ReaderStream::new(file))) {
        Ok(response) => {
            manager.artifact_served(&artifact);
            response
        }
        Err(e) => {
            error!("Failed to build file response: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn content_type_for(filename: &str) -> &'static str {
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "wav" => "audio/wav",
        "flac" => "audio/flac",
        "opus" => "audio/ogg",
        "aac" => "audio/aac",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
}

/// Attachment header with an ASCII fallback name and the exact UTF-8 name.
fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(filename)
    )
}

/// Creates the download routes.
///
/// - POST /download
/// - POST /download_playlist
/// - GET /progress/{id}
/// - GET /playlist_progress/{id}
/// - GET /download_file/{id}
/// - GET /download_playlist/{id}
pub fn download_routes() -> Router<ServerState> {
    Router::new()
        .route("/download", post(start_download))
        .route("/download_playlist", post(start_playlist_download))
        .route("/download_playlist/{id}", get(download_playlist_archive))
        .route("/progress/{id}", get(get_progress))
        .route("/playlist_progress/{id}", get(get_playlist_progress))
        .route("/download_file/{id}", get(download_file))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_disposition_encodes_name() {
        assert_eq!(
            content_disposition("abc_Song.mp3"),
            "attachment; filename=\"abc_Song.mp3\"; filename*=UTF-8''abc_Song.mp3"
        );
        assert_eq!(
            content_disposition("id_Café \"live\".mp3"),
            "attachment; filename=\"id_Caf_ _live_.mp3\"; filename*=UTF-8''id_Caf%C3%A9%20%22live%22.mp3"
        );
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("x_Song.MP3"), "audio/mpeg");
        assert_eq!(content_type_for("playlist_1.zip"), "application/zip");
        assert_eq!(content_type_for("noext"), "application/octet-stream");
    }

    #[test]
    fn test_error_response_shape() {
        let plain = serde_json::to_value(ErrorResponse::new("URL is required")).unwrap();
        assert_eq!(plain, json!({"error": "URL is required"}));

        let mismatch =
            serde_json::to_value(ErrorResponse::playlist_mismatch(USE_SINGLE_BUTTON, false))
                .unwrap();
        assert_eq!(mismatch["is_playlist"], json!(false));
    }
}
