//! yt-dlp backed extractor.
//!
//! Runs the `yt-dlp` binary as a child process. Metadata requests use
//! `--dump-single-json`; downloads print one machine-readable progress line
//! per tick (`--newline --progress-template`) which is parsed and forwarded
//! over the progress channel.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, trace};

use super::{
    ExtractorError, MediaExtractor, MediaInfo, PlaylistInfo, ProgressEvent, ProgressSender,
};

const PROGRESS_PREFIX: &str = "[audio-fetcher]";
const PROGRESS_TEMPLATE: &str = "download:[audio-fetcher] %(progress.status)s|%(progress.downloaded_bytes)s|%(progress.total_bytes)s|%(progress.total_bytes_estimate)s|%(progress.speed)s|%(progress.eta)s|%(info.title)s";
const FORMAT_PREFERENCE: &str = "bestaudio[ext=m4a]/bestaudio[ext=mp3]/bestaudio/best[height<=720]";
const STDERR_TAIL_LINES: usize = 20;

/// Options passed to every yt-dlp invocation.
#[derive(Debug, Clone)]
pub struct ExtractorOptions {
    /// Path or name of the yt-dlp executable.
    pub binary: PathBuf,
    pub audio_format: String,
    /// Target bitrate in kbps.
    pub audio_quality: String,
    pub socket_timeout_secs: u64,
    pub user_agent: String,
    pub proxy_url: Option<String>,
    pub retries: u32,
    pub fragment_retries: u32,
}

impl Default for ExtractorOptions {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("yt-dlp"),
            audio_format: "mp3".to_string(),
            audio_quality: "320".to_string(),
            socket_timeout_secs: 30,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36".to_string(),
            proxy_url: None,
            retries: 3,
            fragment_retries: 3,
        }
    }
}

pub struct YtDlpExtractor {
    options: ExtractorOptions,
}

impl YtDlpExtractor {
    pub fn new(options: ExtractorOptions) -> Self {
        Self { options }
    }

    /// Base command with the network options shared by all invocations.
    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.options.binary);
        cmd.arg("--user-agent")
            .arg(&self.options.user_agent)
            .arg("--socket-timeout")
            .arg(self.options.socket_timeout_secs.to_string())
            .args(["--geo-bypass-country", "US", "--no-colors"]);
        if let Some(proxy) = &self.options.proxy_url {
            cmd.arg("--proxy").arg(proxy);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn dump_json<T: DeserializeOwned>(
        &self,
        mut cmd: Command,
    ) -> Result<Option<T>, ExtractorError> {
        let output = cmd.output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let lines: Vec<String> = stderr.lines().map(|l| l.to_string()).collect();
            return Err(ExtractorError::Failed(summarize_stderr(
                &lines,
                &output.status.to_string(),
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let json = stdout.trim();
        if json.is_empty() || json == "null" {
            return Ok(None);
        }

        serde_json::from_str(json)
            .map(Some)
            .map_err(|e| ExtractorError::InvalidOutput(format!("JSON parse error: {}", e)))
    }
}

#[async_trait]
impl MediaExtractor for YtDlpExtractor {
    async fn extract_info(&self, url: &str) -> Result<Option<MediaInfo>, ExtractorError> {
        let mut cmd = self.command();
        cmd.args(["--dump-single-json", "--skip-download", "--no-playlist", "--"])
            .arg(url);
        self.dump_json(cmd).await
    }

    async fn extract_playlist(&self, url: &str) -> Result<Option<PlaylistInfo>, ExtractorError> {
        let mut cmd = self.command();
        cmd.args(["--flat-playlist", "--dump-single-json", "--"])
            .arg(url);
        self.dump_json(cmd).await
    }

    async fn download(
        &self,
        url: &str,
        output_dir: &Path,
        progress: ProgressSender,
    ) -> Result<(), ExtractorError> {
        let output_template = output_dir.join("%(title)s.%(ext)s");

        let mut cmd = self.command();
        cmd.args(["--format", FORMAT_PREFERENCE, "--extract-audio"])
            .arg("--audio-format")
            .arg(&self.options.audio_format)
            .arg("--audio-quality")
            .arg(format!("{}K", self.options.audio_quality))
            .arg("--output")
            .arg(&output_template)
            .arg("--retries")
            .arg(self.options.retries.to_string())
            .arg("--fragment-retries")
            .arg(self.options.fragment_retries.to_string())
            .args([
                "--no-playlist",
                "--skip-unavailable-fragments",
                "--newline",
                "--progress-template",
                PROGRESS_TEMPLATE,
                "--",
            ])
            .arg(url);

        debug!("Running yt-dlp download for {}", url);
        let mut child = cmd.spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExtractorError::InvalidOutput("stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ExtractorError::InvalidOutput("stderr not captured".to_string()))?;

        // Drain stderr concurrently so the child never blocks on a full pipe.
        let stderr_task = tokio::spawn(async move {
            let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            tail
        });

        let mut saw_finished = false;
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            match parse_progress_line(&line) {
                Some(event) => {
                    if matches!(event, ProgressEvent::Finished { .. }) {
                        saw_finished = true;
                    }
                    // A closed receiver must not abort the transfer.
                    let _ = progress.send(event);
                }
                None => trace!("yt-dlp: {}", line),
            }
        }

        let status = child.wait().await?;
        let stderr_tail: Vec<String> = stderr_task.await.unwrap_or_default().into();

        if !status.success() {
            let message = summarize_stderr(&stderr_tail, &status.to_string());
            let _ = progress.send(ProgressEvent::Error {
                message: message.clone(),
            });
            return Err(ExtractorError::Failed(message));
        }

        if !saw_finished {
            let _ = progress.send(ProgressEvent::Finished { title: None });
        }

        Ok(())
    }
}

/// Parses one line printed through the progress template.
///
/// Returns `None` for any line that is not a progress line.
pub fn parse_progress_line(line: &str) -> Option<ProgressEvent> {
    let rest = line.trim().strip_prefix(PROGRESS_PREFIX)?.trim_start();
    let mut fields = rest.splitn(7, '|');

    let status = fields.next()?.trim();
    let downloaded = parse_number(fields.next());
    let total = parse_number(fields.next());
    let estimate = parse_number(fields.next());
    let speed = parse_number(fields.next());
    let eta = parse_number(fields.next());
    let title = fields
        .next()
        .map(str::trim)
        .filter(|t| !t.is_empty() && *t != "NA")
        .map(str::to_string);

    match status {
        "downloading" => Some(ProgressEvent::Downloading {
            downloaded_bytes: downloaded.map(|v| v as u64).unwrap_or(0),
            total_bytes: total.map(|v| v as u64),
            total_bytes_estimate: estimate.map(|v| v as u64),
            speed,
            eta: eta.map(|v| v as u64),
            title,
        }),
        "finished" => Some(ProgressEvent::Finished { title }),
        "error" => Some(ProgressEvent::Error {
            message: "Extractor reported a download error".to_string(),
        }),
        _ => None,
    }
}

fn parse_number(field: Option<&str>) -> Option<f64> {
    field
        .map(str::trim)
        .filter(|v| *v != "NA")
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v >= 0.0)
}

/// Picks the most useful part of yt-dlp's stderr for error classification.
fn summarize_stderr(lines: &[String], exit_status: &str) -> String {
    let errors: Vec<&str> = lines
        .iter()
        .map(|l| l.trim())
        .filter(|l| l.starts_with("ERROR"))
        .collect();
    if !errors.is_empty() {
        return errors.join("\n");
    }

    let tail: Vec<&str> = lines
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect();
    if tail.is_empty() {
        format!("yt-dlp exited with {}", exit_status)
    } else {
        tail.join("\n")
    }
}
