use futures::StreamExt;
use log::{info, warn};
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::{
    io,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tokio::{
    fs,
    io::{AsyncWriteExt, BufWriter},
};

const WRITE_BUFFER_BYTES: usize = 64 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DownloadStatus {
    Downloaded,
    SkippedExisting,
}

#[derive(Clone, Debug)]
pub struct DownloadOutcome {
    pub destination: PathBuf,
    pub status: DownloadStatus,
    pub bytes: u64,
    pub sha256: Option<String>,
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("failed to create directory {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("download from {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("checksum mismatch for {path:?} (expected {expected}, got {actual})")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },
}

/// Fetches the service binary to its install location.
#[derive(Clone, Debug)]
pub struct Downloader {
    client: Client,
    url: String,
    destination: PathBuf,
    expected_sha256: Option<String>,
    reuse_existing: bool,
}

impl Downloader {
    pub fn new(client: Client, url: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            client,
            url: url.into(),
            destination: destination.into(),
            expected_sha256: None,
            reuse_existing: false,
        }
    }

    pub fn with_expected_sha256(mut self, digest: Option<String>) -> Self {
        self.expected_sha256 = digest
            .map(|digest| digest.trim().to_ascii_lowercase())
            .filter(|digest| !digest.is_empty());
        self
    }

    pub fn reuse_existing(mut self, reuse: bool) -> Self {
        self.reuse_existing = reuse;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Streams the remote file over any existing one. A failed transfer may
    /// leave a truncated file behind.
    pub async fn fetch(&self) -> Result<DownloadOutcome, DownloadError> {
        if let Some(parent) = self.destination.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| DownloadError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        if self.reuse_existing && fs::try_exists(&self.destination).await.unwrap_or(false) {
            info!("Reusing existing binary at {:?}", self.destination);
            return Ok(DownloadOutcome {
                destination: self.destination.clone(),
                status: DownloadStatus::SkippedExisting,
                bytes: 0,
                sha256: None,
            });
        }

        info!("Requesting {}", self.url);
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|source| self.request_error(source))?;

        let file = fs::File::create(&self.destination)
            .await
            .map_err(|source| self.write_error(source))?;
        let mut writer = BufWriter::with_capacity(WRITE_BUFFER_BYTES, file);
        let mut hasher = Sha256::new();
        let mut bytes = 0u64;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|source| self.request_error(source))?;
            hasher.update(&chunk);
            writer
                .write_all(&chunk)
                .await
                .map_err(|source| self.write_error(source))?;
            bytes += chunk.len() as u64;
        }
        writer
            .flush()
            .await
            .map_err(|source| self.write_error(source))?;
        drop(writer);

        let digest = format!("{:x}", hasher.finalize());
        if let Some(expected) = &self.expected_sha256 {
            if *expected != digest {
                let _ = fs::remove_file(&self.destination).await;
                return Err(DownloadError::ChecksumMismatch {
                    path: self.destination.clone(),
                    expected: expected.clone(),
                    actual: digest,
                });
            }
        }

        mark_executable(&self.destination)
            .await
            .map_err(|source| self.write_error(source))?;

        info!(
            "Finished download: {:?} ({} bytes, sha256 {})",
            self.destination, bytes, digest
        );
        Ok(DownloadOutcome {
            destination: self.destination.clone(),
            status: DownloadStatus::Downloaded,
            bytes,
            sha256: Some(digest),
        })
    }

    fn request_error(&self, source: reqwest::Error) -> DownloadError {
        warn!("download from {} failed: {}", self.url, source);
        DownloadError::Request {
            url: self.url.clone(),
            source,
        }
    }

    fn write_error(&self, source: io::Error) -> DownloadError {
        DownloadError::Write {
            path: self.destination.clone(),
            source,
        }
    }
}

#[cfg(unix)]
async fn mark_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).await
}

#[cfg(not(unix))]
async fn mark_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}
