use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all audio-fetcher metrics
const PREFIX: &str = "audio_fetcher";

lazy_static! {
    // Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Request Metrics
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_http_requests_total"), "Total number of HTTP requests"),
        &["method", "endpoint", "status"]
    ).expect("Failed to create http_requests_total metric");

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_http_request_duration_seconds"),
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["method", "endpoint"]
    ).expect("Failed to create http_request_duration_seconds metric");

    // Job Metrics
    pub static ref JOBS_SUBMITTED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_jobs_submitted_total"), "Total jobs submitted"),
        &["kind"]
    ).expect("Failed to create jobs_submitted_total metric");

    pub static ref JOBS_FINISHED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_jobs_finished_total"), "Total jobs that reached a terminal state"),
        &["kind", "outcome"]
    ).expect("Failed to create jobs_finished_total metric");

    pub static ref JOB_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_job_duration_seconds"),
            "Time from job start to terminal state in seconds"
        )
        .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0]),
        &["kind"]
    ).expect("Failed to create job_duration_seconds metric");

    pub static ref DOWNLOAD_FAILURES_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_download_failures_total"), "Failed track downloads by failure family"),
        &["reason"]
    ).expect("Failed to create download_failures_total metric");

    pub static ref ACTIVE_JOBS: Gauge = Gauge::new(
        format!("{PREFIX}_active_jobs"),
        "Number of top-level jobs currently holding a download slot"
    ).expect("Failed to create active_jobs metric");

    // Cleanup Metrics
    pub static ref CLEANUP_DELETIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_cleanup_deletions_total"), "Scheduled artifact deletions by result"),
        &["result"]
    ).expect("Failed to create cleanup_deletions_total metric");

    // Process Metrics
    pub static ref PROCESS_MEMORY_BYTES: Gauge = Gauge::new(
        format!("{PREFIX}_process_memory_bytes"),
        "Process memory usage in bytes"
    ).expect("Failed to create process_memory_bytes metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Register all metrics - ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(JOBS_SUBMITTED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(JOBS_FINISHED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(JOB_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(DOWNLOAD_FAILURES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(ACTIVE_JOBS.clone()));
    let _ = REGISTRY.register(Box::new(CLEANUP_DELETIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(PROCESS_MEMORY_BYTES.clone()));

    tracing::info!("Metrics system initialized successfully");
}

/// Maps a request path to a low-cardinality endpoint label.
pub fn categorize_endpoint(path: &str) -> &'static str {
    let mut segments = path.trim_start_matches('/').split('/');
    let first = segments.next().unwrap_or("");
    let has_id = segments.next().is_some_and(|s| !s.is_empty());
    match (first, has_id) {
        ("", false) => "home",
        ("download", false) => "download",
        ("download_playlist", false) => "download_playlist",
        ("download_playlist", true) => "playlist_archive",
        ("progress", true) => "progress",
        ("playlist_progress", true) => "playlist_progress",
        ("download_file", true) => "download_file",
        _ => "other",
    }
}

/// Record an HTTP request
pub fn record_http_request(method: &str, endpoint: &str, status: u16, duration: Duration) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, endpoint, &status.to_string()])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, endpoint])
        .observe(duration.as_secs_f64());
}

/// Record a new track or playlist submission
pub fn record_job_submitted(kind: &str) {
    JOBS_SUBMITTED_TOTAL.with_label_values(&[kind]).inc();
}

/// Record a job reaching a terminal state
pub fn record_job_finished(kind: &str, outcome: &str, duration: Duration) {
    JOBS_FINISHED_TOTAL
        .with_label_values(&[kind, outcome])
        .inc();

    JOB_DURATION_SECONDS
        .with_label_values(&[kind])
        .observe(duration.as_secs_f64());
}

/// Record a failed track download, labelled with its failure family
pub fn record_download_failure(reason: &str) {
    DOWNLOAD_FAILURES_TOTAL.with_label_values(&[reason]).inc();
}

pub fn inc_active_jobs() {
    ACTIVE_JOBS.inc();
}

pub fn dec_active_jobs() {
    ACTIVE_JOBS.dec();
}

/// Record the result of one scheduled deletion
pub fn record_cleanup(result: &str) {
    CLEANUP_DELETIONS_TOTAL.with_label_values(&[result]).inc();
}

/// Update process memory usage
pub fn update_memory_usage() {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            for line in status.lines() {
                if line.starts_with("VmRSS:") {
                    // RSS is reported in kB
                    if let Some(kb_str) = line.split_whitespace().nth(1) {
                        if let Ok(kb) = kb_str.parse::<f64>() {
                            PROCESS_MEMORY_BYTES.set(kb * 1024.0);
                            return;
                        }
                    }
                }
            }
        }
    }
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    update_memory_usage();

    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_default();
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}
