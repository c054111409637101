//! Audio Fetcher Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod config;
pub mod download_manager;
pub mod extractor;
pub mod platform;
pub mod server;
pub mod tagger;

// Re-export commonly used types for convenience
pub use download_manager::{DownloadManager, JobRegistry};
pub use server::{run_server, RequestsLoggingLevel};
