//! File lifecycle helpers: staging dirs, the permanent store and archives.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tokio::fs;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::error::DownloadError;

const STAGING_PREFIX: &str = "mp3dl_";

/// Owns the staging root and the permanent download directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    download_dir: PathBuf,
    temp_dir: PathBuf,
}

impl FileStore {
    pub fn new(download_dir: impl Into<PathBuf>, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            download_dir: download_dir.into(),
            temp_dir: temp_dir.into(),
        }
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// Creates both directories if they do not exist.
    pub async fn init(&self) -> io::Result<()> {
        fs::create_dir_all(&self.download_dir).await?;
        fs::create_dir_all(&self.temp_dir).await?;
        Ok(())
    }

    /// Creates a fresh staging directory, removed when the returned guard drops.
    pub fn create_staging_dir(&self) -> io::Result<TempDir> {
        std::fs::create_dir_all(&self.temp_dir)?;
        tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(&self.temp_dir)
    }

    /// Moves a finished file into the permanent store as `<job_id>_<name>`.
    ///
    /// Returns the final path and the stored file name.
    pub async fn promote(&self, source: &Path, job_id: &str) -> io::Result<(PathBuf, String)> {
        let original = source
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("Invalid file name: {}", source.display()),
                )
            })?;
        let filename = format!("{}_{}", job_id, original);
        let destination = self.download_dir.join(&filename);

        fs::create_dir_all(&self.download_dir).await?;
        if let Err(e) = fs::rename(source, &destination).await {
            // Staging and store may live on different filesystems.
            debug!(
                "Rename to {} failed ({}), copying instead",
                destination.display(),
                e
            );
            fs::copy(source, &destination).await?;
            fs::remove_file(source).await?;
        }

        Ok((destination, filename))
    }

    /// Path and file name of the archive for a playlist.
    pub fn archive_path(&self, playlist_id: &str) -> (PathBuf, String) {
        let filename = format!("playlist_{}.zip", playlist_id);
        (self.download_dir.join(&filename), filename)
    }
}

/// Finds the file with extension `ext` (case-insensitive) in `dir`.
///
/// With several candidates the lexicographically first one wins.
pub async fn find_output(dir: &Path, ext: &str) -> io::Result<Option<PathBuf>> {
    let mut candidates = Vec::new();
    let mut entries = fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case(ext))
            .unwrap_or(false);
        if matches {
            candidates.push(path);
        }
    }

    candidates.sort();
    Ok(candidates.into_iter().next())
}

/// Writes a Deflate-compressed archive at `zip_path` holding `files` under
/// their base names.
pub async fn write_archive(zip_path: PathBuf, files: Vec<PathBuf>) -> Result<(), DownloadError> {
    tokio::task::spawn_blocking(move || write_archive_blocking(&zip_path, &files))
        .await
        .map_err(|e| DownloadError::Archive(e.to_string()))?
}

fn write_archive_blocking(zip_path: &Path, files: &[PathBuf]) -> Result<(), DownloadError> {
    let file = std::fs::File::create(zip_path)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for path in files {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| DownloadError::Archive(format!("Invalid file name: {}", path.display())))?;
        zip.start_file(name, options)?;
        let mut source = std::fs::File::open(path)?;
        io::copy(&mut source, &mut zip)?;
    }

    zip.finish()?;
    Ok(())
}
