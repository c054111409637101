//! HTTP client for end-to-end tests
//!
//! This module provides a high-level HTTP client that wraps reqwest
//! and provides methods for all download endpoints.
//!
//! When API routes or request formats change, update only this file.

use super::constants::*;
use reqwest::Response;
use serde_json::{json, Value};
use std::time::Duration;

/// HTTP test client
pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    #[allow(dead_code)]
    pub client: reqwest::Client,
    /// The base URL of the test server
    pub base_url: String,
}

#[allow(dead_code)]
impl TestClient {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self { client, base_url }
    }

    // ========================================================================
    // Submission Endpoints
    // ========================================================================

    /// POST /download
    pub async fn download(&self, url: &str) -> Response {
        self.post_json("/download", json!({ "url": url })).await
    }

    /// POST /download_playlist
    pub async fn download_playlist(&self, url: &str) -> Response {
        self.post_json("/download_playlist", json!({ "url": url }))
            .await
    }

    /// POST with an arbitrary JSON body
    pub async fn post_json(&self, path: &str, body: Value) -> Response {
        self.client
            .post(format!("{}{}", self.base_url, path))
            .json(&body)
            .send()
            .await
            .expect("Request failed")
    }

    // ========================================================================
    // Progress Endpoints
    // ========================================================================

    /// GET /progress/{id}
    pub async fn progress(&self, job_id: &str) -> Response {
        self.get(&format!("/progress/{}", job_id)).await
    }

    /// GET /playlist_progress/{id}
    pub async fn playlist_progress(&self, playlist_id: &str) -> Response {
        self.get(&format!("/playlist_progress/{}", playlist_id))
            .await
    }

    /// Polls /progress until the job is completed or failed
    ///
    /// # Panics
    ///
    /// Panics if the job does not finish within `JOB_TIMEOUT_MS`.
    pub async fn wait_for_job(&self, job_id: &str) -> Value {
        self.wait_for_terminal(&format!("/progress/{}", job_id))
            .await
    }

    /// Polls /playlist_progress until the playlist is completed or failed
    pub async fn wait_for_playlist(&self, playlist_id: &str) -> Value {
        self.wait_for_terminal(&format!("/playlist_progress/{}", playlist_id))
            .await
    }

    async fn wait_for_terminal(&self, path: &str) -> Value {
        let start = std::time::Instant::now();
        loop {
            let body: Value = self
                .get(path)
                .await
                .json()
                .await
                .expect("Progress response is not JSON");
            if matches!(body["status"].as_str(), Some("completed") | Some("error")) {
                return body;
            }
            assert!(
                start.elapsed() < Duration::from_millis(JOB_TIMEOUT_MS),
                "{} did not finish in time, last state: {}",
                path,
                body
            );
            tokio::time::sleep(Duration::from_millis(JOB_POLL_INTERVAL_MS)).await;
        }
    }

    // ========================================================================
    // Retrieval Endpoints
    // ========================================================================

    /// GET /download_file/{id}
    pub async fn download_file(&self, job_id: &str) -> Response {
        self.get(&format!("/download_file/{}", job_id)).await
    }

    /// GET /download_playlist/{id}
    pub async fn download_playlist_archive(&self, playlist_id: &str) -> Response {
        self.get(&format!("/download_playlist/{}", playlist_id))
            .await
    }

    /// GET /
    pub async fn home(&self) -> Response {
        self.get("/").await
    }

    async fn get(&self, path: &str) -> Response {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .expect("Request failed")
    }
}
