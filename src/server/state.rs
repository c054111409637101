use axum::extract::FromRef;

use crate::download_manager::DownloadManager;
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

pub type GuardedDownloadManager = Arc<DownloadManager>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub download_manager: GuardedDownloadManager,
}

impl ServerState {
    pub fn new(config: ServerConfig, download_manager: GuardedDownloadManager) -> Self {
        ServerState {
            config,
            start_time: Instant::now(),
            download_manager,
        }
    }
}

impl FromRef<ServerState> for GuardedDownloadManager {
    fn from_ref(input: &ServerState) -> Self {
        input.download_manager.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}
