//! Test server lifecycle management
//!
//! This module manages spawning and shutting down test HTTP servers.
//! Each test gets an isolated server with its own download directories.

use super::constants::*;
use super::fixtures::{NoopTagger, ScriptedExtractor};
use audio_fetcher::config::{DownloadSettings, PlatformSettings};
use audio_fetcher::download_manager::{DownloadManager, JobRegistry};
use audio_fetcher::server::{make_app, RequestsLoggingLevel, ServerConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Test server instance with isolated storage
///
/// When dropped, the server gracefully shuts down and temp resources are cleaned up.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// Port the server is listening on
    #[allow(dead_code)]
    pub port: u16,

    /// Directory finished files and archives land in
    #[allow(dead_code)]
    pub download_dir: PathBuf,

    _temp_dir: TempDir,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Spawns a new test server on a random port
    ///
    /// Downloads are served by the scripted extractor, see `fixtures`.
    pub async fn spawn() -> Self {
        Self::spawn_with_cleanup_delay(DownloadSettings::default().cleanup_delay_secs).await
    }

    /// Spawns a test server whose finished files are deleted `delay_secs`
    /// after they are served
    pub async fn spawn_with_cleanup_delay(delay_secs: u64) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let download_dir = temp_dir.path().join("downloads");

        let settings = DownloadSettings {
            download_dir: download_dir.clone(),
            temp_dir: temp_dir.path().join("staging"),
            cleanup_delay_secs: delay_secs,
            ..Default::default()
        };
        let manager = DownloadManager::new(
            &settings,
            PlatformSettings::default(),
            Arc::new(JobRegistry::new()),
            Arc::new(ScriptedExtractor),
            Arc::new(NoopTagger),
        );
        manager
            .init()
            .await
            .expect("Failed to create download directories");

        // Bind to random available port
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();

        let base_url = format!("http://127.0.0.1:{}", port);

        // Create shutdown channel
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let config = ServerConfig {
            port,
            requests_logging_level: RequestsLoggingLevel::None,
            ..Default::default()
        };
        let app = make_app(config, Arc::new(manager));

        // Spawn server in background task with graceful shutdown
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url,
            port,
            download_dir,
            _temp_dir: temp_dir,
            _shutdown_tx: Some(shutdown_tx),
        };

        server.wait_for_ready().await;

        server
    }

    /// Waits for the server to become ready by polling the home endpoint
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => return,
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        // Send shutdown signal
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
        // TempDir will be cleaned up automatically
    }
}
