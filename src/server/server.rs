use anyhow::{Context, Result};
use std::future::IntoFuture;
use std::time::Duration;

use axum::{extract::State, middleware, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use tower_http::services::ServeDir;
use tracing::info;

use super::download_routes::download_routes;
use super::metrics::metrics_handler;
use super::state::{GuardedDownloadManager, ServerState};
use super::{log_requests, ServerConfig};
use crate::download_manager::ManagerStats;

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub version: String,
    pub downloads: ManagerStats,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        version: env!("CARGO_PKG_VERSION").to_string(),
        downloads: state.download_manager.stats(),
    };
    Json(stats)
}

pub fn make_app(config: ServerConfig, download_manager: GuardedDownloadManager) -> Router {
    let state = ServerState::new(config.clone(), download_manager);

    let home_router: Router<ServerState> = match config.frontend_dir_path {
        Some(frontend_path) => {
            let static_files_service =
                ServeDir::new(frontend_path).append_index_html_on_directories(true);
            Router::new().fallback_service(static_files_service)
        }
        None => Router::new().route("/", get(home)),
    };

    home_router
        .merge(download_routes())
        .layer(middleware::from_fn_with_state(state.clone(), log_requests))
        .with_state(state)
}

fn make_metrics_app() -> Router {
    Router::new().route("/metrics", get(metrics_handler))
}

/// Serves the API on `config.port` and Prometheus metrics on `config.metrics_port`.
pub async fn run_server(
    config: ServerConfig,
    download_manager: GuardedDownloadManager,
) -> Result<()> {
    let port = config.port;
    let metrics_port = config.metrics_port;
    let app = make_app(config, download_manager);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;
    let metrics_listener = tokio::net::TcpListener::bind(("0.0.0.0", metrics_port))
        .await
        .with_context(|| format!("Failed to bind metrics port {}", metrics_port))?;

    info!("Ready to serve at port {}!", port);
    info!("Metrics available at port {}!", metrics_port);

    tokio::select! {
        result = axum::serve(listener, app).into_future() => result.context("HTTP server failed"),
        result = axum::serve(metrics_listener, make_metrics_app()).into_future() => {
            result.context("Metrics server failed")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DownloadSettings, PlatformSettings};
    use crate::download_manager::{DownloadManager, JobRegistry};
    use crate::extractor::{
        ExtractorError, MediaExtractor, MediaInfo, PlaylistInfo, ProgressSender,
    };
    use crate::tagger::{AudioTagger, TaggerError, TrackTags};
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tower::ServiceExt; // for `oneshot`

    /// Never reached by these tests: every request is rejected or answered
    /// before a job would run.
    struct UnreachableExtractor;

    #[async_trait]
    impl MediaExtractor for UnreachableExtractor {
        async fn extract_info(&self, _url: &str) -> Result<Option<MediaInfo>, ExtractorError> {
            Err(ExtractorError::Failed("not available in tests".to_string()))
        }

        async fn extract_playlist(
            &self,
            _url: &str,
        ) -> Result<Option<PlaylistInfo>, ExtractorError> {
            Err(ExtractorError::Failed("not available in tests".to_string()))
        }

        async fn download(
            &self,
            _url: &str,
            _output_dir: &Path,
            _progress: ProgressSender,
        ) -> Result<(), ExtractorError> {
            Err(ExtractorError::Failed("not available in tests".to_string()))
        }
    }

    struct NoopTagger;

    #[async_trait]
    impl AudioTagger for NoopTagger {
        async fn write_tags(&self, _path: &Path, _tags: &TrackTags) -> Result<(), TaggerError> {
            Ok(())
        }
    }

    fn test_app(dir: &TempDir) -> Router {
        let settings = DownloadSettings {
            download_dir: dir.path().join("downloads"),
            temp_dir: dir.path().join("tmp"),
            ..Default::default()
        };
        let manager = DownloadManager::new(
            &settings,
            PlatformSettings::default(),
            Arc::new(JobRegistry::new()),
            Arc::new(UnreachableExtractor),
            Arc::new(NoopTagger),
        );
        let config = ServerConfig {
            requests_logging_level: crate::server::RequestsLoggingLevel::None,
            ..Default::default()
        };
        make_app(config, Arc::new(manager))
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(Duration::from_secs(0)), "0d 00:00:00");
        assert_eq!(format_uptime(Duration::from_secs(90_061)), "1d 01:01:01");
    }

    #[tokio::test]
    async fn home_returns_stats() {
        let dir = TempDir::new().unwrap();
        let app = test_app(&dir);

        let (status, body) = send(&app, get("/")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["version"], json!(env!("CARGO_PKG_VERSION")));
        assert_eq!(body["downloads"]["tracked_jobs"], json!(0));
    }

    #[tokio::test]
    async fn rejects_invalid_submissions() {
        let dir = TempDir::new().unwrap();
        let app = test_app(&dir);

        let (status, body) = send(&app, post_json("/download", json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"error": "URL is required"}));

        let (status, body) = send(&app, post_json("/download", json!({"url": "nope"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], json!("Invalid URL format"));

        let (status, body) = send(
            &app,
            post_json("/download", json!({"url": "https://open.spotify.com/track/1"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().starts_with("Spotify is not supported"));
    }

    #[tokio::test]
    async fn rejects_endpoint_mismatch() {
        let dir = TempDir::new().unwrap();
        let app = test_app(&dir);

        let (status, body) = send(
            &app,
            post_json(
                "/download",
                json!({"url": "https://www.youtube.com/playlist?list=PL123"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["is_playlist"], json!(true));

        let (status, body) = send(
            &app,
            post_json(
                "/download_playlist",
                json!({"url": "https://www.youtube.com/watch?v=abc"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["is_playlist"], json!(false));
    }

    #[tokio::test]
    async fn unknown_ids_report_not_found() {
        let dir = TempDir::new().unwrap();
        let app = test_app(&dir);

        let (status, body) = send(&app, get("/progress/missing")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({"status": "not_found", "percentage": 0, "message": "Download not found"})
        );

        let (status, body) = send(&app, get("/playlist_progress/missing")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], json!("not_found"));
        assert_eq!(body["overall_percentage"], json!(0));

        let (status, body) = send(&app, get("/download_file/missing")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], json!("Download not completed or not found"));

        let (status, body) = send(&app, get("/download_playlist/missing")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(
            body["error"],
            json!("Playlist download not completed or not found")
        );
    }

    #[tokio::test]
    async fn metrics_endpoint_serves_text() {
        crate::server::metrics::init_metrics();
        let response = make_metrics_app().oneshot(get("/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
