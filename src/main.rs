use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use audio_fetcher::config::{self, CleanupTrigger};
use audio_fetcher::download_manager::{DownloadManager, JobRegistry};
use audio_fetcher::extractor::YtDlpExtractor;
use audio_fetcher::server::{metrics, run_server, RequestsLoggingLevel, ServerConfig};
use audio_fetcher::tagger::LoftyTagger;

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(format!("Error resolving path '{}': {}", s, msg));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 5000)]
    pub port: u16,

    /// The port for the metrics server (Prometheus scraping).
    #[clap(long, default_value_t = 9091)]
    pub metrics_port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Path to the frontend directory to be statically served.
    #[clap(long)]
    pub frontend_dir_path: Option<String>,

    /// Directory where finished files and playlist archives are kept.
    #[clap(long, value_parser = parse_path)]
    pub download_dir: Option<PathBuf>,

    /// Root for per-job staging directories. Defaults to the system temp dir.
    #[clap(long, value_parser = parse_path)]
    pub temp_dir: Option<PathBuf>,

    /// Output audio format.
    #[clap(long, default_value = "mp3")]
    pub audio_format: String,

    /// Output bitrate in kbps.
    #[clap(long, default_value = "320")]
    pub audio_quality: String,

    /// Seconds before a finished file is deleted.
    #[clap(long, default_value_t = 300)]
    pub cleanup_delay_secs: u64,

    /// What starts the deletion countdown of a finished file.
    #[clap(long, value_enum, default_value_t = CleanupTrigger::Retrieval)]
    pub cleanup_trigger: CleanupTrigger,

    /// Maximum number of downloads running at the same time.
    #[clap(long, default_value_t = 3)]
    pub max_concurrent_downloads: usize,

    /// Network timeout in seconds handed to the extractor.
    #[clap(long, default_value_t = 30)]
    pub timeout_sec: u64,

    /// Proxy URL used by the extractor.
    #[clap(long)]
    pub proxy_url: Option<String>,

    /// Path to the yt-dlp binary. Looked up on PATH when not set.
    #[clap(long)]
    pub ytdlp_path: Option<PathBuf>,

    /// Embed the item's thumbnail as front cover art.
    #[clap(long)]
    pub embed_cover_art: bool,
}

/// Convert CLI args to CliConfig for config resolution
impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            port: args.port,
            metrics_port: args.metrics_port,
            logging_level: args.logging_level.clone(),
            frontend_dir_path: args.frontend_dir_path.clone(),
            download_dir: args.download_dir.clone(),
            temp_dir: args.temp_dir.clone(),
            audio_format: args.audio_format.clone(),
            audio_quality: args.audio_quality.clone(),
            cleanup_delay_secs: args.cleanup_delay_secs,
            cleanup_trigger: args.cleanup_trigger,
            max_concurrent_downloads: args.max_concurrent_downloads,
            timeout_sec: args.timeout_sec,
            proxy_url: args.proxy_url.clone(),
            ytdlp_path: args.ytdlp_path.clone(),
            embed_cover_art: args.embed_cover_art,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    // Load TOML config if provided
    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Some(config::FileConfig::load(path)?)
        }
        None => None,
    };

    // Resolve final configuration (TOML overrides CLI)
    let cli_config: config::CliConfig = (&cli_args).into();
    let app_config = config::AppConfig::resolve(&cli_config, file_config)?;

    info!("Configuration loaded:");
    info!("  port: {}", app_config.port);
    info!("  download_dir: {:?}", app_config.download.download_dir);
    info!("  temp_dir: {:?}", app_config.download.temp_dir);
    info!(
        "  format: {} @ {}kbps",
        app_config.download.audio_format, app_config.download.audio_quality
    );
    info!(
        "  cleanup: {:?} after {}s",
        app_config.download.cleanup_trigger, app_config.download.cleanup_delay_secs
    );
    info!(
        "  max_concurrent_downloads: {}",
        app_config.download.max_concurrent_downloads
    );

    // Initialize metrics system
    info!("Initializing metrics...");
    metrics::init_metrics();

    let extractor = Arc::new(YtDlpExtractor::new(
        app_config.download.extractor_options(),
    ));
    let tagger = Arc::new(LoftyTagger::new(app_config.download.embed_cover_art));
    let download_manager = DownloadManager::new(
        &app_config.download,
        app_config.platforms.clone(),
        Arc::new(JobRegistry::new()),
        extractor,
        tagger,
    );
    download_manager
        .init()
        .await
        .context("Failed to prepare download directories")?;

    let server_config = ServerConfig {
        requests_logging_level: app_config.logging_level.clone(),
        port: app_config.port,
        metrics_port: app_config.metrics_port,
        frontend_dir_path: app_config.frontend_dir_path.clone(),
    };

    tokio::select! {
        result = run_server(server_config, Arc::new(download_manager)) => {
            info!("HTTP server stopped: {:?}", result);
            result
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
            Ok(())
        }
    }
}
